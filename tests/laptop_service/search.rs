use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pcbook::pb::{CreateLaptopRequest, Filter, Laptop, SearchLaptopRequest};
use pcbook::service::ServiceConfig;
use pcbook::store::{filter_matches, LaptopStore};
use tonic::transport::Channel;

use crate::support::{bulky_laptop, laptop, start_server, start_server_on, ObservedLaptopStore};

const BULKY_LAPTOPS: usize = 2000;
const BULKY_BYTES: usize = 2048;

async fn bulky_server() -> (crate::support::TestServer, Arc<ObservedLaptopStore>) {
    let store = Arc::new(ObservedLaptopStore::default());
    for _ in 0..BULKY_LAPTOPS {
        store.save(&bulky_laptop(BULKY_BYTES)).unwrap();
    }
    let ts = start_server_on(store.clone(), ServiceConfig::default()).await;
    (ts, store)
}

async fn create(client: &mut pcbook::pb::LaptopServiceClient<Channel>, laptop: Laptop) {
    client
        .create_laptop(CreateLaptopRequest {
            laptop: Some(laptop),
        })
        .await
        .unwrap();
}

async fn search(
    client: &mut pcbook::pb::LaptopServiceClient<Channel>,
    filter: Option<Filter>,
) -> Vec<Laptop> {
    let mut stream = client
        .search_laptop(SearchLaptopRequest { filter })
        .await
        .unwrap()
        .into_inner();

    let mut found = Vec::new();
    while let Some(resp) = stream.message().await.unwrap() {
        found.push(resp.laptop.unwrap());
    }
    found
}

#[tokio::test]
async fn search_finds_matching_laptop() {
    let mut ts = start_server().await;
    let laptop = laptop(999.0, 4, 2.5);
    create(&mut ts.client, laptop.clone()).await;

    let filter = Filter {
        max_price_usd: 1500.0,
        min_cpu_cores: 2,
        ..Default::default()
    };
    let found = search(&mut ts.client, Some(filter)).await;

    assert_eq!(found, vec![laptop]);
}

#[tokio::test]
async fn search_streams_only_matches_without_duplicates() {
    let mut ts = start_server().await;
    let laptops = vec![
        laptop(999.0, 4, 2.5),
        laptop(2500.0, 8, 3.5),
        laptop(1200.0, 2, 2.0),
        laptop(1400.0, 6, 3.0),
        laptop(300.0, 1, 1.6),
    ];
    for l in &laptops {
        create(&mut ts.client, l.clone()).await;
    }

    let filter = Filter {
        max_price_usd: 1500.0,
        min_cpu_cores: 2,
        min_cpu_ghz: 2.2,
        ..Default::default()
    };
    let found = search(&mut ts.client, Some(filter.clone())).await;

    let expected: HashSet<_> = laptops
        .iter()
        .filter(|l| filter_matches(Some(&filter), l))
        .map(|l| l.id.clone())
        .collect();
    let ids: HashSet<_> = found.iter().map(|l| l.id.clone()).collect();

    assert_eq!(found.len(), 2);
    assert_eq!(ids.len(), found.len());
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn search_without_filter_returns_everything() {
    let mut ts = start_server().await;
    for _ in 0..40 {
        create(&mut ts.client, laptop(999.0, 4, 2.5)).await;
    }

    let found = search(&mut ts.client, None).await;
    assert_eq!(found.len(), 40);
}

#[tokio::test]
async fn search_on_empty_store_ends_immediately() {
    let mut ts = start_server().await;
    assert!(search(&mut ts.client, Some(Filter::default())).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn creates_proceed_while_a_search_reader_stalls() {
    let (ts, _store) = bulky_server().await;
    let mut reader = ts.client.clone();

    let mut stream = reader
        .search_laptop(SearchLaptopRequest { filter: None })
        .await
        .unwrap()
        .into_inner();
    assert!(stream.message().await.unwrap().is_some());

    // The reader now sits on a full stream while writers pile in.
    let creates: Vec<_> = (0..8)
        .map(|_| {
            let mut client = ts.client.clone();
            tokio::spawn(async move {
                client
                    .create_laptop(CreateLaptopRequest {
                        laptop: Some(laptop(999.0, 4, 2.5)),
                    })
                    .await
            })
        })
        .collect();
    for create in creates {
        let created = tokio::time::timeout(Duration::from_secs(10), create)
            .await
            .expect("create blocked behind a stalled search")
            .unwrap();
        assert!(created.is_ok());
    }

    let mut received = 1;
    let drained = tokio::time::timeout(Duration::from_secs(30), async {
        while stream.message().await.unwrap().is_some() {
            received += 1;
        }
    })
    .await;
    assert!(drained.is_ok(), "search never finished");
    assert_eq!(received, BULKY_LAPTOPS);
}

#[tokio::test]
async fn dropping_the_reader_aborts_the_scan() {
    let (mut ts, store) = bulky_server().await;

    let mut stream = ts
        .client
        .search_laptop(SearchLaptopRequest { filter: None })
        .await
        .unwrap()
        .into_inner();
    assert!(stream.message().await.unwrap().is_some());
    drop(stream);

    let started = Instant::now();
    let outcomes = loop {
        let outcomes = store.outcomes();
        if !outcomes.is_empty() {
            break outcomes;
        }
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "scan still running after the reader left"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].as_ref().unwrap_err().contains("search aborted"));
    assert!(store.visited() < BULKY_LAPTOPS);
}
