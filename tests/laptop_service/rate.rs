use std::time::Duration;

use pcbook::pb::{CreateLaptopRequest, RateLaptopRequest, RateLaptopResponse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Code;

use crate::support::{laptop, start_server, TestServer};

async fn create_laptop(ts: &mut TestServer) -> String {
    ts.client
        .create_laptop(CreateLaptopRequest {
            laptop: Some(laptop(999.0, 4, 2.5)),
        })
        .await
        .unwrap()
        .into_inner()
        .id
}

fn rate(laptop_id: &str, score: f64) -> RateLaptopRequest {
    RateLaptopRequest {
        laptop_id: laptop_id.to_string(),
        score,
    }
}

#[tokio::test]
async fn rate_returns_running_average_per_request() {
    let mut ts = start_server().await;
    let laptop_id = create_laptop(&mut ts).await;

    let mut stream = ts
        .client
        .rate_laptop(tokio_stream::iter(vec![
            rate(&laptop_id, 4.0),
            rate(&laptop_id, 5.0),
        ]))
        .await
        .unwrap()
        .into_inner();

    let mut responses = Vec::new();
    while let Some(resp) = stream.message().await.unwrap() {
        responses.push(resp);
    }

    assert_eq!(
        responses,
        vec![
            RateLaptopResponse {
                laptop_id: laptop_id.clone(),
                rated_count: 1,
                average_score: 4.0,
            },
            RateLaptopResponse {
                laptop_id,
                rated_count: 2,
                average_score: 4.5,
            },
        ]
    );
}

#[tokio::test]
async fn ratings_accumulate_across_streams_and_laptops() {
    let mut ts = start_server().await;
    let first = create_laptop(&mut ts).await;
    let second = create_laptop(&mut ts).await;

    for _ in 0..3 {
        let mut stream = ts
            .client
            .rate_laptop(tokio_stream::iter(vec![
                rate(&first, 3.0),
                rate(&second, 5.0),
            ]))
            .await
            .unwrap()
            .into_inner();
        while stream.message().await.unwrap().is_some() {}
    }

    let first_rating = ts.server.rating_store().find(&first).unwrap().unwrap();
    let second_rating = ts.server.rating_store().find(&second).unwrap().unwrap();
    assert_eq!((first_rating.count, first_rating.sum), (3, 9.0));
    assert_eq!((second_rating.count, second_rating.sum), (3, 15.0));
}

#[tokio::test]
async fn concurrent_rating_streams_lose_no_updates() {
    let mut ts = start_server().await;
    let laptop_id = create_laptop(&mut ts).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let mut client = ts.client.clone();
            let requests: Vec<_> = (0..25).map(|_| rate(&laptop_id, 2.0)).collect();
            tokio::spawn(async move {
                let mut stream = client
                    .rate_laptop(tokio_stream::iter(requests))
                    .await
                    .unwrap()
                    .into_inner();
                while stream.message().await.unwrap().is_some() {}
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let rating = ts.server.rating_store().find(&laptop_id).unwrap().unwrap();
    assert_eq!(rating.count, 200);
    assert_eq!(rating.sum, 400.0);
}

#[tokio::test]
async fn rating_unknown_laptop_ends_the_stream() {
    let mut ts = start_server().await;
    let laptop_id = create_laptop(&mut ts).await;
    let missing = uuid::Uuid::new_v4().to_string();

    let mut stream = ts
        .client
        .rate_laptop(tokio_stream::iter(vec![
            rate(&laptop_id, 4.0),
            rate(&missing, 4.0),
            rate(&laptop_id, 5.0),
        ]))
        .await
        .unwrap()
        .into_inner();

    let first = stream.message().await.unwrap().unwrap();
    assert_eq!(first.rated_count, 1);

    let status = stream.message().await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    let rating = ts.server.rating_store().find(&laptop_id).unwrap().unwrap();
    assert_eq!(rating.count, 1);
}

#[tokio::test]
async fn negative_score_is_rejected() {
    let mut ts = start_server().await;
    let laptop_id = create_laptop(&mut ts).await;

    // The failure may surface on the call itself or as the first message,
    // depending on whether response headers were flushed first.
    let status = match ts
        .client
        .rate_laptop(tokio_stream::iter(vec![rate(&laptop_id, -1.0)]))
        .await
    {
        Err(status) => status,
        Ok(resp) => resp.into_inner().message().await.unwrap_err(),
    };
    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(ts.server.rating_store().find(&laptop_id).unwrap().is_none());
}

#[tokio::test]
async fn empty_rating_stream_completes_cleanly() {
    let mut ts = start_server().await;

    let mut stream = ts
        .client
        .rate_laptop(tokio_stream::iter(Vec::<RateLaptopRequest>::new()))
        .await
        .unwrap()
        .into_inner();

    assert!(stream.message().await.unwrap().is_none());
}

#[tokio::test]
async fn deadline_passing_mid_stream_ends_the_rating() {
    let mut ts = start_server().await;
    let laptop_id = create_laptop(&mut ts).await;

    let (tx, rx) = mpsc::channel(4);
    let mut request = tonic::Request::new(ReceiverStream::new(rx));
    request
        .metadata_mut()
        .insert("grpc-timeout", "300m".parse().unwrap());
    let mut stream = ts.client.rate_laptop(request).await.unwrap().into_inner();

    tx.send(rate(&laptop_id, 4.0)).await.unwrap();
    let first = stream.message().await.unwrap().unwrap();
    assert_eq!(first.rated_count, 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    tx.send(rate(&laptop_id, 5.0)).await.unwrap();

    let status = stream.message().await.unwrap_err();
    assert_eq!(status.code(), Code::DeadlineExceeded);
    let rating = ts.server.rating_store().find(&laptop_id).unwrap().unwrap();
    assert_eq!(rating.count, 1);
}
