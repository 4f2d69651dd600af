use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use log::trace;

use crate::error::TaskError;
use crate::object::ObjectRef;

pub(crate) async fn get<T>(object: &ObjectRef<T>) -> Result<T, TaskError>
    where T: Clone + Send + Sync + 'static
{
    let completion = object.raw().completion().await;
    object.extract(completion)
}

pub(crate) async fn get_all<T>(objects: &[ObjectRef<T>]) -> Result<Vec<T>, TaskError>
    where T: Clone + Send + Sync + 'static
{
    let completions = join_all(objects.iter().map(|object| object.raw().completion())).await;
    objects
        .iter()
        .zip(completions)
        .map(|(object, completion)| object.extract(completion))
        .collect()
}

pub(crate) async fn wait<T>(
    objects: Vec<ObjectRef<T>>,
    num_returns: usize,
    timeout: Option<Duration>,
) -> (Vec<ObjectRef<T>>, Vec<ObjectRef<T>>) {
    let wanted = num_returns.min(objects.len());
    if wanted == 0 {
        return (Vec::new(), objects);
    }

    let mut pending: FuturesUnordered<_> = objects
        .iter()
        .filter(|object| !object.is_ready())
        .map(|object| object.raw().completion())
        .collect();
    let already = objects.len() - pending.len();
    if already < wanted {
        let arrivals = async {
            let mut seen = already;
            while seen < wanted && pending.next().await.is_some() {
                seen += 1;
            }
        };
        match timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, arrivals).await.is_err() {
                    trace!("wait timed out after {:?}", limit);
                }
            }
            None => arrivals.await,
        }
    }
    drop(pending);

    partition(objects, wanted)
}

/// Pick the `wanted` earliest completed objects and split the input into
/// `(ready, remaining)` without reordering either side.
fn partition<T>(objects: Vec<ObjectRef<T>>, wanted: usize) -> (Vec<ObjectRef<T>>, Vec<ObjectRef<T>>) {
    let mut finished: Vec<(u64, usize)> = objects
        .iter()
        .enumerate()
        .filter_map(|(index, object)| object.raw().peek().map(|completion| (completion.seq, index)))
        .collect();
    finished.sort_unstable();
    finished.truncate(wanted);

    let mut chosen = vec![false; objects.len()];
    for (_, index) in finished {
        chosen[index] = true;
    }

    let mut ready = Vec::with_capacity(wanted);
    let mut remaining = Vec::with_capacity(objects.len() - wanted.min(objects.len()));
    for (object, chosen) in objects.into_iter().zip(chosen) {
        if chosen {
            ready.push(object);
        } else {
            remaining.push(object);
        }
    }
    (ready, remaining)
}
