use std::time::Duration;

use fan_in::{Config, Direction, Error, Forward, Handle, Input, IntoHandle, Receiver, Sender};
use futures_core::future::BoxFuture;
use futures_lite::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const DEADLINE: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn drain<T>(mut merged: Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    timeout(DEADLINE, async {
        while let Some(item) = merged.recv().await {
            out.push(item);
        }
    })
    .await
    .expect("merged output did not close in time");

    // Closed is terminal.
    for _ in 0..3 {
        assert!(merged.recv().await.is_none());
    }
    assert!(merged.is_closed());
    out
}

fn both_strategies<T: Send + 'static>() -> [Config<T>; 2] {
    [Config::new(), Config::typed()]
}

#[tokio::test]
async fn no_sources() {
    let cancel = CancellationToken::new();
    for config in both_strategies::<i32>() {
        let err = config.merge(&cancel, Vec::<Handle>::new()).unwrap_err();
        assert_eq!(err, Error::NoSources);
    }
}

#[tokio::test]
async fn invalid_argument_at_any_position() {
    init_tracing();
    let cancel = CancellationToken::new();

    for position in 0..4 {
        let sources = |bad: Handle| {
            let mut handles: Vec<Handle> = (0..4)
                .map(|_| mpsc::channel::<i32>(1).1.into_handle())
                .collect();
            handles[position] = bad;
            handles
        };

        let err = fan_in::merge::<i32, _>(&cancel, sources(Handle::opaque(5))).unwrap_err();
        assert!(
            matches!(err, Error::NotASequence { index, .. } if index == position),
            "{err}"
        );

        let (tx, _rx) = mpsc::channel::<i32>(1);
        let err = fan_in::merge::<i32, _>(&cancel, sources(tx.into_handle())).unwrap_err();
        assert_eq!(
            err,
            Error::WriteOnly {
                index: position,
                direction: Direction::Send
            }
        );

        let (_tx, rx) = mpsc::channel::<String>(1);
        let err = fan_in::merge::<i32, _>(&cancel, sources(rx.into_handle())).unwrap_err();
        let expected_index = if position == 0 { 1 } else { position };
        assert!(
            matches!(err, Error::TypeMismatch { index, .. } if index == expected_index),
            "{err}"
        );
    }
}

#[tokio::test]
async fn single_source_keeps_order() {
    init_tracing();
    for config in both_strategies::<u32>() {
        let cancel = CancellationToken::new();
        let source = Handle::stream(stream::iter(0..100u32));
        let merged = config.merge(&cancel, [source]).unwrap();
        assert_eq!(drain(merged).await, (0..100).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn single_unclosed_source_keeps_output_open() {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(1);
    let mut merged = Config::i32s().merge(&cancel, [rx]).unwrap();

    tx.send(5).await.unwrap();
    assert_eq!(timeout(DEADLINE, merged.recv()).await.unwrap(), Some(5));
    assert!(!merged.is_closed());
    assert!(timeout(Duration::from_millis(20), merged.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn two_sources() {
    for config in both_strategies::<i32>() {
        let cancel = CancellationToken::new();
        let merged = config
            .merge(
                &cancel,
                [
                    Handle::stream(stream::iter(vec![1, 3])),
                    Handle::stream(stream::iter(vec![2, 4])),
                ],
            )
            .unwrap();

        let mut all = drain(merged).await;
        all.sort_unstable();
        assert_eq!(all, [1, 2, 3, 4]);
    }
}

#[tokio::test]
async fn empty_sources_close_immediately() {
    for config in both_strategies::<i32>() {
        let cancel = CancellationToken::new();
        let sources: Vec<_> = (0..10)
            .map(|_| {
                let (_tx, rx) = mpsc::channel::<i32>(1);
                rx
            })
            .collect();

        let merged = config.merge(&cancel, sources).unwrap();
        assert!(drain(merged).await.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_sources_deliver_everything() {
    init_tracing();
    for config in both_strategies::<usize>() {
        for channels in [2, 11, 50] {
            for max in [5, 11, 50, 200] {
                let cancel = CancellationToken::new();
                let (senders, receivers): (Vec<_>, Vec<_>) =
                    (0..channels).map(|_| mpsc::channel::<usize>(1)).unzip();

                let merged = config.merge(&cancel, receivers).unwrap();

                tokio::spawn(async move {
                    for n in 0..max {
                        senders[n % channels].send(n).await.unwrap();
                    }
                });

                let mut all = drain(merged).await;
                all.sort_unstable();
                assert_eq!(
                    all,
                    (0..max).collect::<Vec<_>>(),
                    "channels: {channels}, values: {max}"
                );
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_closes_output_of_open_sources() {
    for config in both_strategies::<i32>() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let mut merged = config.merge(&cancel, [rx]).unwrap();

        tx.send(5).await.unwrap();
        assert_eq!(timeout(DEADLINE, merged.recv()).await.unwrap(), Some(5));

        cancel.cancel();
        // Whatever arrives after cancellation is unspecified, only the close is.
        drain(merged).await;
        drop(tx);
    }
}

#[tokio::test]
async fn premature_cancellation() {
    let cancel = CancellationToken::new();
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..10).map(|_| mpsc::channel::<i32>(1)).unzip();
    let merged = fan_in::merge::<i32, _>(&cancel, receivers).unwrap();

    tokio::spawn({
        let cancel = cancel.clone();
        async move { cancel.cancel() }
    });

    assert!(drain(merged).await.is_empty());
    drop(senders);
}

#[tokio::test]
async fn strategies_agree() {
    let mut results = Vec::new();
    for config in both_strategies::<String>() {
        let cancel = CancellationToken::new();
        let sources = ["a b c", "d e", "f"]
            .map(|words| Handle::stream(stream::iter(words.split(' ').map(String::from))));

        let mut all = drain(config.merge(&cancel, sources).unwrap()).await;
        all.sort_unstable();
        results.push(all);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], ["a", "b", "c", "d", "e", "f"]);
}

#[tokio::test]
async fn dropping_the_output_stops_the_workers() {
    for config in both_strategies::<u8>() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let merged = config.merge(&cancel, [rx]).unwrap();

        tx.send(1).await.unwrap();
        drop(merged);

        // The worker lets go of its source once it notices nobody is listening.
        timeout(DEADLINE, tx.closed())
            .await
            .expect("worker kept its source alive");
    }
}

#[tokio::test]
async fn duplex_and_merged_sources() {
    let cancel = CancellationToken::new();

    let (tx, rx) = mpsc::channel(4);
    let feeder = tx.clone();
    let inner = Config::u64s()
        .merge(
            &cancel,
            [
                Handle::stream(stream::iter(vec![1u64, 2])),
                (tx, rx).into_handle(),
            ],
        )
        .unwrap();
    feeder.send(3).await.unwrap();
    drop(feeder);

    let outer = fan_in::merge::<u64, _>(
        &cancel,
        [inner.into_handle(), Handle::stream(stream::once(4u64))],
    )
    .unwrap();

    let mut all = drain(outer).await;
    all.sort_unstable();
    assert_eq!(all, [1, 2, 3, 4]);
}

/// Doubles every element on its way through.
struct Doubling;

impl Forward<i64> for Doubling {
    fn advance<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        input: &'a mut Input<i64>,
        output: &'a Sender<i64>,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => true,
                next = input.next() => match next {
                    Some(n) => output.send(n * 2).await.is_err(),
                    None => true,
                },
            }
        })
    }
}

#[tokio::test]
async fn custom_strategy() {
    let cancel = CancellationToken::new();
    let config = Config::<i64>::with_forward(Doubling);
    assert!(config.is_specialized());

    let merged = config
        .merge(
            &cancel,
            [
                Handle::stream(stream::iter(vec![1i64, 2])),
                Handle::stream(stream::iter(vec![3i64])),
            ],
        )
        .unwrap();

    let mut all = drain(merged).await;
    all.sort_unstable();
    assert_eq!(all, [2, 4, 6]);
}
