mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskforce::{Arg, ObjectState, RemoteFunction, Runtime, RuntimeConfig, StdError, TaskError};

fn square() -> RemoteFunction<i64, i64> {
    RemoteFunction::new("square", |x: i64| Ok(x * x))
}

fn nap() -> RemoteFunction<u64, u64> {
    RemoteFunction::new("nap", |ms: u64| {
        thread::sleep(Duration::from_millis(ms));
        Ok(ms)
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remote_function_results() {
    let runtime = common::runtime(4);
    let square = square();

    let objects: Vec<_> = (0..8).map(|i| square.remote(&runtime, Arg::from(i))).collect();
    assert_eq!(runtime.get_all(&objects).await.unwrap(), vec![0, 1, 4, 9, 16, 25, 36, 49]);
    assert_eq!(runtime.get(&objects[3]).await.unwrap(), 9);
    assert_eq!(objects[3].state(), ObjectState::Resolved);
    assert_eq!(objects[3].try_get().unwrap().unwrap(), 9);
    assert_eq!(runtime.pending_objects(), 0);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submission_does_not_block() {
    let runtime = common::runtime(2);
    let nap = nap();

    let started = Instant::now();
    let objects: Vec<_> = (0..100).map(|_| nap.remote(&runtime, Arg::from(50))).collect();
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(50), "submitting took {:?}", elapsed);
    assert!(objects.iter().all(|object| !object.is_ready()));

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_references_as_arguments() {
    let runtime = common::runtime(4);
    let square = square();
    let add = RemoteFunction::new("add", |(a, b): (i64, i64)| Ok(a + b));

    let x = square.remote(&runtime, Arg::from(3));
    let y = square.remote(&runtime, Arg::from(4));
    let sum = add.remote(&runtime, (x.clone(), y));
    assert_eq!(runtime.get(&sum).await.unwrap(), 25);

    let mixed = add.remote(&runtime, (Arg::from(1), Arg::Pending(x)));
    assert_eq!(runtime.get(&mixed).await.unwrap(), 10);

    let chained = square.remote(&runtime, square.remote(&runtime, Arg::from(2)));
    assert_eq!(runtime.get(&chained).await.unwrap(), 16);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dependency_waits_for_producer() {
    let runtime = common::runtime(4);
    let slow = RemoteFunction::new("slow", |value: i64| {
        thread::sleep(Duration::from_millis(100));
        Ok(value)
    });
    let double = RemoteFunction::new("double", |value: i64| Ok(value * 2));

    let produced = slow.remote(&runtime, Arg::from(21));
    let consumed = double.remote(&runtime, produced.clone());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(consumed.state(), ObjectState::Pending);
    assert_eq!(runtime.get(&consumed).await.unwrap(), 42);
    assert!(produced.is_ready());

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failure_propagates_to_dependents() {
    let runtime = common::runtime(2);
    let ran = Arc::new(AtomicBool::new(false));

    let fail = RemoteFunction::new("fail", |_: ()| -> Result<i64, StdError> {
        Err("bad input".into())
    });
    let marker = ran.clone();
    let consume = RemoteFunction::new("consume", move |value: i64| {
        marker.store(true, Ordering::SeqCst);
        Ok(value)
    });

    let failed = fail.remote(&runtime, ());
    let downstream = consume.remote(&runtime, failed.clone());
    let err = runtime.get(&downstream).await.expect_err("dependency failed");
    match &err {
        TaskError::Dependency { object, source } => {
            assert_eq!(object, failed.id());
            assert!(matches!(**source, TaskError::UserFunction { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.root_cause().to_string(), "fail failed: bad input");
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(downstream.state(), ObjectState::Failed);

    // every reader sees the same failure
    let again = runtime.get(&failed).await.unwrap_err();
    assert_eq!(again.to_string(), "fail failed: bad input");

    runtime.shutdown().await;
}

#[derive(Debug, thiserror::Error)]
#[error("value {0} is odd")]
struct OddValue(i64);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_user_error_downcast() {
    let runtime = common::runtime(2);
    let halve = RemoteFunction::new("halve", |value: i64| -> Result<i64, StdError> {
        if value % 2 == 1 {
            return Err(OddValue(value).into());
        }
        Ok(value / 2)
    });

    let err = runtime.get(&halve.remote(&runtime, Arg::from(7))).await.unwrap_err();
    assert_eq!(err.user_error::<OddValue>().map(|odd| odd.0), Some(7));

    let nested = halve.remote(&runtime, halve.remote(&runtime, Arg::from(3)));
    let err = runtime.get(&nested).await.unwrap_err();
    assert_eq!(err.user_error::<OddValue>().map(|odd| odd.0), Some(3));

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_body_fails_object() {
    let runtime = common::runtime(2);
    let explode = RemoteFunction::new("explode", |_: ()| -> Result<i64, StdError> {
        panic!("boom")
    });

    let err = runtime.get(&explode.remote(&runtime, ())).await.unwrap_err();
    match err {
        TaskError::Panicked { function, message } => {
            assert_eq!(&*function, "explode");
            assert_eq!(message.as_str(), "boom");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // the pool is still usable afterwards
    assert_eq!(runtime.get(&square().remote(&runtime, Arg::from(3))).await.unwrap(), 9);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_arguments_are_copied() {
    let runtime = common::runtime(2);
    let numbers = RemoteFunction::new("numbers", |_: ()| Ok(vec![1, 2, 3]));
    let push = RemoteFunction::new("push", |mut values: Vec<i32>| {
        values.push(4);
        Ok(values)
    });

    let original = numbers.remote(&runtime, ());
    let extended = push.remote(&runtime, original.clone());
    assert_eq!(runtime.get(&extended).await.unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(runtime.get(&original).await.unwrap(), vec![1, 2, 3]);

    let mine = vec![7];
    let copied = push.remote(&runtime, Arg::from(mine.clone()));
    assert_eq!(runtime.get(&copied).await.unwrap(), vec![7, 4]);
    assert_eq!(mine, vec![7]);

    let mut fetched = runtime.get(&original).await.unwrap();
    fetched.clear();
    assert_eq!(runtime.get(&original).await.unwrap(), vec![1, 2, 3]);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bounds_concurrency() {
    let runtime = common::runtime(2);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (now, max) = (running.clone(), peak.clone());
    let busy = RemoteFunction::new("busy", move |_: ()| {
        let current = now.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(current, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        now.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    });
    let objects: Vec<_> = (0..10).map(|_| busy.remote(&runtime, ())).collect();
    runtime.get_all(&objects).await.unwrap();
    assert!(peak.load(Ordering::SeqCst) <= 2);

    // a function demanding the whole pool runs alone
    let (now, max) = (running.clone(), peak.clone());
    max.store(0, Ordering::SeqCst);
    let wide = RemoteFunction::new("wide", move |_: ()| {
        let current = now.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(current, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        now.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }).num_cpus(2);
    let objects: Vec<_> = (0..4).map(|_| wide.remote(&runtime, ())).collect();
    runtime.get_all(&objects).await.unwrap();
    assert_eq!(peak.load(Ordering::SeqCst), 1);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_cpu_functions_bypass_pool() {
    let runtime = common::runtime(1);
    let nap = nap();
    let light = RemoteFunction::new("light", |x: i64| Ok(x + 1)).num_cpus(0);

    let blocker = nap.remote(&runtime, Arg::from(300));
    let quick = light.remote(&runtime, Arg::from(1));
    assert_eq!(runtime.get(&quick).await.unwrap(), 2);
    assert!(!blocker.is_ready());

    // oversized demands are clamped to the pool instead of hanging
    let greedy = RemoteFunction::new("greedy", |x: i64| Ok(x)).num_cpus(16);
    assert_eq!(runtime.get(&greedy.remote(&runtime, Arg::from(5))).await.unwrap(), 5);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_queued_task() {
    let runtime = common::runtime(2);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let after = RemoteFunction::new("after", move |value: u64| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    });
    let square = square();

    let first = nap().remote(&runtime, Arg::from(200));
    let second = after.remote(&runtime, first.clone());
    let third = square.remote(&runtime, Arg::from(3));
    let dependent = after.remote(&runtime, second.clone());

    assert!(runtime.cancel(&second));
    assert!(!runtime.cancel(&second));
    match runtime.get(&second).await {
        Err(TaskError::Cancelled { object }) => assert_eq!(&object, second.id()),
        other => panic!("unexpected result: {:?}", other),
    }
    let err = runtime.get(&dependent).await.unwrap_err();
    assert!(matches!(err.root_cause(), TaskError::Cancelled { .. }));

    assert_eq!(runtime.get(&first).await.unwrap(), 200);
    assert_eq!(runtime.get(&third).await.unwrap(), 9);
    assert!(!runtime.cancel(&first));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_free_completed_objects() {
    let runtime = common::runtime(2);
    let square = square();

    let blocker = nap().remote(&runtime, Arg::from(200));
    let done = square.remote(&runtime, Arg::from(6));
    assert_eq!(runtime.get(&done).await.unwrap(), 36);

    assert_eq!(runtime.free(&[done.id().clone(), blocker.id().clone()]), 1);
    assert_eq!(runtime.object_state(done.id()), None);
    assert_eq!(runtime.object_state(blocker.id()), Some(ObjectState::Pending));
    // existing references keep their value
    assert_eq!(runtime.get(&done).await.unwrap(), 36);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_finished_objects_are_released() {
    let runtime = common::runtime(4);
    let square = square();

    for i in 0..500 {
        let object = square.remote(&runtime, Arg::from(i));
        assert_eq!(runtime.get(&object).await.unwrap(), i * i);
    }
    let kept = square.remote(&runtime, Arg::from(3));
    assert_eq!(runtime.get(&kept).await.unwrap(), 9);
    common::eventually(|| runtime.tracked_objects() == 1).await;

    // intermediate results go once their consumer has run
    let chained = square.remote(&runtime, square.remote(&runtime, Arg::from(2)));
    assert_eq!(runtime.get(&chained).await.unwrap(), 16);
    common::eventually(|| runtime.tracked_objects() == 2).await;

    drop(kept);
    drop(chained);
    assert_eq!(runtime.tracked_objects(), 0);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deferred_start() {
    common::init_logging();
    let config = RuntimeConfig::default().num_workers(2).start_on_launch(false);
    let runtime = Runtime::create(config).unwrap();
    assert!(!runtime.is_started());

    let object = square().remote(&runtime, Arg::from(5));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(object.state(), ObjectState::Pending);
    assert_eq!(runtime.pending_objects(), 1);

    runtime.start();
    assert!(runtime.is_started());
    assert_eq!(runtime.get(&object).await.unwrap(), 25);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocking_get_inside_body() {
    let runtime = common::runtime(4);
    let square = square();

    let rt = runtime.clone();
    let inner = square.clone();
    let sum_of_squares = RemoteFunction::new("sum_of_squares", move |n: i64| {
        let parts: Vec<_> = (0..n).map(|i| inner.remote(&rt, Arg::from(i))).collect();
        Ok(rt.get_all_blocking(&parts)?.into_iter().sum::<i64>())
    });
    assert_eq!(runtime.get(&sum_of_squares.remote(&runtime, Arg::from(4))).await.unwrap(), 14);

    let rt = runtime.clone();
    let object = square.remote(&runtime, Arg::from(9));
    let fetched = tokio::task::spawn_blocking(move || rt.get_blocking(&object)).await.unwrap();
    assert_eq!(fetched.unwrap(), 81);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_parent_outside_pool() {
    let runtime = common::runtime(1);
    let square = square();

    let rt = runtime.clone();
    let child = square.clone();
    let parent = RemoteFunction::new("parent", move |x: i64| {
        let object = child.remote(&rt, Arg::from(x));
        Ok(rt.get_blocking(&object)? + 1)
    }).num_cpus(0);
    assert_eq!(runtime.get(&parent.remote(&runtime, Arg::from(6))).await.unwrap(), 37);

    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_fails_outstanding_work() {
    let runtime = common::runtime(2);
    let square = square();

    let slow = nap().remote(&runtime, Arg::from(200));
    let waiting = RemoteFunction::new("waiting", |ms: u64| Ok(ms)).remote(&runtime, slow);
    runtime.shutdown().await;
    assert!(runtime.is_shut_down());

    assert!(matches!(runtime.get(&waiting).await, Err(TaskError::RuntimeShutdown)));
    let late = square.remote(&runtime, Arg::from(2));
    assert!(matches!(runtime.get(&late).await, Err(TaskError::RuntimeShutdown)));
}
