//! Worker pool. N async workers pulling due jobs from the delay queue, one at a time each.

use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;
use crate::scheduler::DelayQueue;

#[derive(Debug)]
pub struct WorkerPool {
	token: CancellationToken,
	dispatcher: JoinHandle<()>,
	workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
	/// Start the queue dispatcher and `concurrency` workers
	pub fn start<S>(queue: Arc<DelayQueue<S>>, state: S, concurrency: usize) -> ClResult<Self>
	where
		S: Clone + Send + Sync + 'static,
	{
		if concurrency == 0 {
			return Err(Error::ConfigError("worker concurrency must be at least 1".into()));
		}

		let token = CancellationToken::new();
		let dispatcher = queue.start(token.clone())?;

		let workers = (0..concurrency)
			.map(|n| {
				let queue = Arc::clone(&queue);
				let state = state.clone();
				let token = token.clone();
				tokio::spawn(async move { worker_loop(n, &queue, &state, &token).await })
			})
			.collect();

		info!("Worker pool started with {} workers", concurrency);
		Ok(Self { token, dispatcher, workers })
	}

	/// Stop handing out jobs and wait for in-flight jobs to finish.
	/// Workers still busy after `timeout` are aborted; their processing locks expire on their own.
	pub async fn drain_and_close(self, timeout: Duration) -> ClResult<()> {
		info!("Draining worker pool ({} workers)", self.workers.len());
		self.token.cancel();

		if let Err(err) = self.dispatcher.await {
			error!("Delay queue dispatcher ended abnormally: {}", err);
		}

		let aborts: Vec<_> = self.workers.iter().map(JoinHandle::abort_handle).collect();
		match tokio::time::timeout(timeout, join_all(self.workers)).await {
			Ok(results) => {
				for err in results.into_iter().filter_map(Result::err) {
					error!("Worker ended abnormally: {}", err);
				}
				info!("Worker pool closed");
				Ok(())
			}
			Err(_) => {
				warn!("Worker pool drain timed out after {:?}, aborting in-flight jobs", timeout);
				for abort in aborts {
					abort.abort();
				}
				Err(Error::Timeout)
			}
		}
	}
}

async fn worker_loop<S>(n: usize, queue: &DelayQueue<S>, state: &S, token: &CancellationToken)
where
	S: Clone + Send + Sync + 'static,
{
	let rx = queue.receiver();
	debug!("Worker {} started", n);
	loop {
		let job = tokio::select! {
			biased;
			() = token.cancelled() => break,
			job = rx.recv_async() => match job {
				Ok(job) => job,
				Err(_) => break,
			},
		};
		queue.execute(job, state).await;
	}
	debug!("Worker {} stopped", n);
}


// vim: ts=4
