//! Delay queue. Holds one job per id and releases it to the worker pool no earlier than
//! its target time, with retries and an aggregate jobs-per-hour ceiling.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::{
	collections::{BTreeMap, HashMap, HashSet},
	fmt::Debug,
	num::NonZeroU32,
	sync::{Arc, Mutex},
	time::Duration,
};
use tokio_util::sync::CancellationToken;

use crate::prelude::*;
use cadence_types::lock;

pub type JobId = Box<str>;

/// What the queue should do with a job after a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
	Done,
	/// Put the job back under the same id, due at the given time.
	/// Does not count as a failed attempt.
	RetryAt(Timestamp),
}

#[async_trait]
pub trait Task<S: Clone>: Send + Sync + Debug {
	fn kind() -> &'static str
	where
		Self: Sized;
	fn kind_of(&self) -> &'static str;
	async fn run(&self, state: &S) -> ClResult<TaskOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
	wait_min_max: (u64, u64),
	times: u16,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { wait_min_max: (5, 3600), times: 2 }
	}
}

impl RetryPolicy {
	/// Create a new RetryPolicy with custom min/max backoff (seconds) and number of retries
	pub fn new(wait_min_max: (u64, u64), times: u16) -> Self {
		Self { wait_min_max, times }
	}

	/// Calculate exponential backoff in seconds: min * (2^attempt), capped at max
	pub fn calculate_backoff(&self, attempt_count: u16) -> u64 {
		let (min, max) = self.wait_min_max;
		let factor = 1u64.checked_shl(u32::from(attempt_count)).unwrap_or(u64::MAX);
		min.saturating_mul(factor).min(max)
	}

	/// Check if we should continue retrying
	pub fn should_retry(&self, attempt_count: u16) -> bool {
		attempt_count < self.times
	}

	pub fn times(&self) -> u16 {
		self.times
	}
}

// Job
//*****
#[derive(Clone)]
pub struct Job<S: Clone> {
	pub id: JobId,
	pub task: Arc<dyn Task<S>>,
	pub next_at: Timestamp,
	retry_count: u16,
	retry: Option<RetryPolicy>,
}

impl<S: Clone> Debug for Job<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Job")
			.field("id", &self.id)
			.field("kind", &self.task.kind_of())
			.field("next_at", &self.next_at)
			.field("retry_count", &self.retry_count)
			.finish()
	}
}

// JobBuilder - Fluent API for job scheduling
//********************************************
pub struct JobBuilder<'a, S: Clone> {
	queue: &'a DelayQueue<S>,
	id: JobId,
	task: Arc<dyn Task<S>>,
	next_at: Option<Timestamp>,
	retry: Option<RetryPolicy>,
}

impl<'a, S: Clone + Send + Sync + 'static> JobBuilder<'a, S> {
	fn new(queue: &'a DelayQueue<S>, id: JobId, task: Arc<dyn Task<S>>) -> Self {
		Self { queue, id, task, next_at: None, retry: None }
	}

	/// Schedule for a specific absolute timestamp
	pub fn schedule_at(mut self, timestamp: Timestamp) -> Self {
		self.next_at = Some(timestamp);
		self
	}

	/// Schedule after a relative delay (in milliseconds)
	pub fn schedule_after_millis(mut self, millis: i64) -> Self {
		self.next_at = Some(Timestamp::from_now(millis));
		self
	}

	/// Enable automatic retry with exponential backoff
	pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
		self.retry = Some(policy);
		self
	}

	/// Make the job due immediately
	pub fn now(self) -> ClResult<JobId> {
		self.schedule()
	}

	/// Make the job due at a specific timestamp
	pub fn at(mut self, ts: Timestamp) -> ClResult<JobId> {
		self.next_at = Some(ts);
		self.schedule()
	}

	/// Queue the job with all configured options - main terminal method
	pub fn schedule(self) -> ClResult<JobId> {
		let job = Job {
			id: self.id,
			task: self.task,
			next_at: self.next_at.unwrap_or_else(Timestamp::now),
			retry_count: 0,
			retry: self.retry,
		};
		self.queue.add_queue(job)
	}
}

/// Health status of the delay queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueHealth {
	/// Jobs waiting for their target time
	pub pending: usize,
	/// Jobs handed to a worker and not yet completed
	pub running: usize,
	/// Earliest target time among pending jobs
	pub next_due: Option<Timestamp>,
}

struct QueueState<S: Clone> {
	timeline: BTreeMap<(Timestamp, JobId), Job<S>>,
	due_at: HashMap<JobId, Timestamp>,
	running: HashSet<JobId>,
}

impl<S: Clone> QueueState<S> {
	/// Inserts a job, replacing any pending entry with the same id
	fn insert(&mut self, job: Job<S>) -> Option<Timestamp> {
		let replaced = self.due_at.insert(job.id.clone(), job.next_at);
		if let Some(prev) = replaced {
			self.timeline.remove(&(prev, job.id.clone()));
		}
		self.timeline.insert((job.next_at, job.id.clone()), job);
		replaced
	}

	fn remove(&mut self, id: &str) -> Option<Job<S>> {
		let at = self.due_at.remove(id)?;
		self.timeline.remove(&(at, JobId::from(id)))
	}
}

// DelayQueue
//************
pub struct DelayQueue<S: Clone> {
	state: Mutex<QueueState<S>>,
	notify_schedule: tokio::sync::Notify,
	tx: Mutex<Option<flume::Sender<Job<S>>>>,
	rx: flume::Receiver<Job<S>>,
	ceiling: Option<DefaultDirectRateLimiter>,
}

impl<S: Clone + Send + Sync + 'static> DelayQueue<S> {
	/// Create a queue. `max_jobs_per_hour` caps the aggregate dispatch rate (0: no ceiling).
	pub fn new(max_jobs_per_hour: u32) -> Arc<Self> {
		let (tx, rx) = flume::bounded(0);
		let ceiling = NonZeroU32::new(max_jobs_per_hour)
			.map(|per_hour| RateLimiter::direct(Quota::per_hour(per_hour)));

		Arc::new(Self {
			state: Mutex::new(QueueState {
				timeline: BTreeMap::new(),
				due_at: HashMap::new(),
				running: HashSet::new(),
			}),
			notify_schedule: tokio::sync::Notify::new(),
			tx: Mutex::new(Some(tx)),
			rx,
			ceiling,
		})
	}

	/// Create a builder for scheduling a job using the fluent API
	pub fn job(&self, id: impl Into<JobId>, task: Arc<dyn Task<S>>) -> JobBuilder<'_, S> {
		JobBuilder::new(self, id.into(), task)
	}

	/// Queue a job. A pending job with the same id is replaced, so at most one entry
	/// exists per id.
	pub fn add_queue(&self, job: Job<S>) -> ClResult<JobId> {
		let id = job.id.clone();
		let next_at = job.next_at;
		let replaced = lock!(self.state, "state")?.insert(job);
		match replaced {
			Some(prev) => debug!("Rescheduled job {} from {} to {}", id, prev, next_at),
			None => debug!("Scheduling job {} for {}", id, next_at),
		}
		self.notify_schedule.notify_one();
		Ok(id)
	}

	/// Remove a pending job. Returns false if no job with that id is waiting.
	/// A job already handed to a worker is not interrupted.
	pub fn cancel(&self, id: &str) -> ClResult<bool> {
		let removed = lock!(self.state, "state")?.remove(id).is_some();
		if removed {
			debug!("Cancelled job {}", id);
			self.notify_schedule.notify_one();
		}
		Ok(removed)
	}

	/// Target time of a pending job
	pub fn scheduled_at(&self, id: &str) -> ClResult<Option<Timestamp>> {
		Ok(lock!(self.state, "state")?.due_at.get(id).copied())
	}

	pub fn health(&self) -> ClResult<QueueHealth> {
		let state = lock!(self.state, "state")?;
		Ok(QueueHealth {
			pending: state.timeline.len(),
			running: state.running.len(),
			next_due: state.timeline.keys().next().map(|(at, _)| *at),
		})
	}

	/// Receiving end for workers. Jobs are only handed over when a worker asks for one.
	pub fn receiver(&self) -> flume::Receiver<Job<S>> {
		self.rx.clone()
	}

	/// Start the dispatcher. It stops when `token` is cancelled; undispatched jobs stay queued.
	pub fn start(self: &Arc<Self>, token: CancellationToken) -> ClResult<tokio::task::JoinHandle<()>> {
		let tx = lock!(self.tx, "tx")?
			.take()
			.ok_or_else(|| Error::Internal("delay queue already started".into()))?;
		let queue = Arc::clone(self);
		Ok(tokio::spawn(async move { queue.dispatch_loop(tx, token).await }))
	}

	async fn dispatch_loop(&self, tx: flume::Sender<Job<S>>, token: CancellationToken) {
		loop {
			let now = Timestamp::now();
			let next_due = match self.health() {
				Ok(health) => health.next_due,
				Err(err) => {
					error!("Delay queue state unavailable: {}", err);
					break;
				}
			};

			match next_due {
				Some(at) if at <= now => {}
				Some(at) => {
					let wait = Duration::from_millis(at.millis_from_now());
					tokio::select! {
						() = tokio::time::sleep(wait) => (),
						() = self.notify_schedule.notified() => (),
						() = token.cancelled() => break,
					}
					continue;
				}
				None => {
					tokio::select! {
						() = self.notify_schedule.notified() => (),
						() = token.cancelled() => break,
					}
					continue;
				}
			}

			let job = match self.take_due(now) {
				Ok(Some(job)) => job,
				Ok(None) => continue,
				Err(err) => {
					error!("Delay queue state unavailable: {}", err);
					break;
				}
			};

			if let Some(ceiling) = &self.ceiling {
				tokio::select! {
					() = ceiling.until_ready() => (),
					() = token.cancelled() => {
						self.put_back(job);
						break;
					}
				}
			}

			debug!("Dispatching job {}", job.id);
			let held = job.clone();
			tokio::select! {
				biased;
				res = tx.send_async(job) => {
					if res.is_err() {
						warn!("No worker left to receive job {}", held.id);
						self.put_back(held);
						break;
					}
				}
				() = token.cancelled() => {
					self.put_back(held);
					break;
				}
			}
		}
		info!("Delay queue dispatcher stopped");
	}

	fn take_due(&self, now: Timestamp) -> ClResult<Option<Job<S>>> {
		let mut state = lock!(self.state, "state")?;
		let Some((at, id)) = state.timeline.keys().next().cloned() else {
			return Ok(None);
		};
		if at > now {
			return Ok(None);
		}
		let job = state.remove(&id);
		if job.is_some() {
			state.running.insert(id);
		}
		Ok(job)
	}

	/// Return an undelivered job, unless it was rescheduled in the meantime
	fn put_back(&self, job: Job<S>) {
		match self.state.lock() {
			Ok(mut state) => {
				state.running.remove(&job.id);
				if !state.due_at.contains_key(&job.id) {
					state.insert(job);
				}
			}
			Err(_) => error!("Mutex poisoned: state, job {} lost", job.id),
		}
	}

	/// Run a delivered job and apply its outcome
	pub async fn execute(&self, job: Job<S>, state: &S) {
		debug!("Running job {} ({})", job.id, job.task.kind_of());
		let result = job.task.run(state).await;
		if let Err(err) = self.complete(job, result) {
			error!("Failed to complete job: {}", err);
		}
	}

	fn complete(&self, mut job: Job<S>, result: ClResult<TaskOutcome>) -> ClResult<()> {
		let mut state = lock!(self.state, "state")?;
		state.running.remove(&job.id);

		match result {
			Ok(TaskOutcome::Done) => {
				debug!("Job {} completed", job.id);
				return Ok(());
			}
			Ok(TaskOutcome::RetryAt(at)) => {
				info!("Job {} put back until {}", job.id, at);
				job.next_at = at;
			}
			Err(err) => match &job.retry {
				Some(policy) if policy.should_retry(job.retry_count) => {
					let backoff = policy.calculate_backoff(job.retry_count);
					info!(
						"Job {} failed (attempt {}/{}). Scheduling retry in {} seconds: {}",
						job.id,
						job.retry_count + 1,
						policy.times + 1,
						backoff,
						err
					);
					job.retry_count += 1;
					job.next_at = Timestamp::from_now(
						i64::try_from(backoff.saturating_mul(1000)).unwrap_or(i64::MAX),
					);
				}
				Some(_) => {
					error!("Job {} failed after {} retries: {}", job.id, job.retry_count, err);
					return Ok(());
				}
				None => {
					error!("Job {} failed: {}", job.id, err);
					return Ok(());
				}
			},
		}

		state.insert(job);
		drop(state);
		self.notify_schedule.notify_one();
		Ok(())
	}
}


// vim: ts=4
