//! Dispatcher - 期限が来た Job を 1 件ずつ送る単一ループ
//!
//! # フロー
//! 1. JobQueue::lease() で期限の来た Job を取得
//! 2. 送信前チェック（送信窓・電話番号・メディア URL）
//! 3. MessageSender::send()（別タスク + タイムアウト）
//! 4. lease.ack() / lease.fail() で結果を記録
//! 5. Pacing の待ち時間だけ休む（成功・失敗に関係なく毎回）
//!
//! 送信側の失敗・タイムアウト・panic はすべて `failed` ログになり、
//! ループは止まらない。

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::pacing::Pacing;
use crate::domain::errors::SendError;
use crate::domain::{HeraldError, Job};
use crate::observability::QueueCounts;
use crate::ports::{MessageSender, OutboundMessage};
use crate::queue::{JobLease, JobQueue};

pub const DEFAULT_BODY_TEMPLATE: &str = "Hello {name}";
pub const DEFAULT_GRACE: Duration = Duration::from_secs(60);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// How late a job may become due before it is failed instead of sent.
    /// `None` sends regardless of lateness.
    pub grace: Option<Duration>,
    pub send_timeout: Duration,
    /// `{name}` and `{phone}` are substituted.
    pub body_template: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            grace: Some(DEFAULT_GRACE),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            body_template: DEFAULT_BODY_TEMPLATE.to_string(),
        }
    }
}

/// Render the message body for a job.
pub fn render_body(template: &str, job: &Job) -> String {
    template
        .replace("{name}", job.recipient_name().unwrap_or(""))
        .replace("{phone}", job.recipient_phone())
        .trim_end()
        .to_string()
}

/// Media must be reachable by the messaging vendor.
pub fn is_public_media_url(media: &str) -> bool {
    let lower = media.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Dispatcher handle.
/// - `request_shutdown()` で新しい lease を取らなくなる
/// - 送信中の 1 件は最後まで送り、結果を記録してから止まる
pub struct Dispatcher {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Dispatcher {
    pub fn spawn(
        queue: Arc<dyn JobQueue>,
        sender: Arc<dyn MessageSender>,
        pacing: Arc<Pacing>,
        settings: DispatchSettings,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            dispatch_loop(queue, sender, pacing, settings, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    /// Stop taking new jobs. An in-flight send is not cancelled.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already have exited
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for the loop to exit.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            error!(error = %e, "dispatcher task ended abnormally");
        }
    }
}

async fn dispatch_loop(
    queue: Arc<dyn JobQueue>,
    sender: Arc<dyn MessageSender>,
    pacing: Arc<Pacing>,
    settings: DispatchSettings,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    info!("dispatcher started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // lease は待つ可能性があるので shutdown と競合させる
        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            lease = queue.lease() => lease,
        };

        let Some(lease) = lease else {
            tokio::task::yield_now().await;
            continue;
        };

        dispatch_one(lease, &sender, &settings).await;

        // 成功・失敗に関係なく毎回休む。値は毎回読み直す
        let delay = pacing.delay();
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }
    info!("dispatcher stopped");
}

async fn dispatch_one(
    lease: Box<dyn JobLease>,
    sender: &Arc<dyn MessageSender>,
    settings: &DispatchSettings,
) {
    let job = lease.job().clone();
    let job_id = job.job_id().clone();

    if let Some(refusal) = refuse_before_send(&job, lease.lateness(), settings) {
        warn!(job_id = %job_id, reason = %refusal, "job not sent");
        if let Err(e) = lease.fail(refusal).await {
            error!(job_id = %job_id, error = %e, "could not record failure");
        }
        return;
    }

    let message = OutboundMessage {
        to: job.recipient_phone().to_string(),
        body: render_body(&settings.body_template, &job),
        media: job.media_reference().map(|m| m.trim().to_string()),
    };

    // 別タスクで送ることで、送信側の panic もここで捕まえられる
    let task_sender = Arc::clone(sender);
    let mut handle = tokio::spawn(async move { task_sender.send(&message).await });

    let outcome = match tokio::time::timeout(settings.send_timeout, &mut handle).await {
        Ok(Ok(Ok(delivery_id))) => Ok(delivery_id),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(join_error)) => Err(format!("sender crashed: {join_error}")),
        Err(_) => {
            handle.abort();
            Err(SendError::Timeout(settings.send_timeout).to_string())
        }
    };

    let recorded = match outcome {
        Ok(delivery_id) => {
            info!(job_id = %job_id, delivery_id = %delivery_id, "delivered");
            lease.ack(delivery_id).await
        }
        Err(reason) => {
            warn!(job_id = %job_id, error = %reason, "send failed");
            lease.fail(reason).await
        }
    };
    if let Err(e) = recorded {
        error!(job_id = %job_id, error = %e, "could not record send result");
    }
}

fn refuse_before_send(job: &Job, lateness: TimeDelta, settings: &DispatchSettings) -> Option<String> {
    if let Some(grace) = settings.grace
        && lateness.to_std().is_ok_and(|late| late > grace)
    {
        return Some(format!(
            "missed its send window: due {} but became due {}s late (grace {}s)",
            job.scheduled_at().to_rfc3339(),
            lateness.num_seconds(),
            grace.as_secs()
        ));
    }
    if !job.is_sendable() {
        return Some("no recipient phone number".to_string());
    }
    if let Some(media) = job.media_reference()
        && !is_public_media_url(media)
    {
        return Some(format!("media must be a public http(s) URL: {media}"));
    }
    None
}

/// Poll until nothing is scheduled or sending.
pub async fn wait_until_settled(
    queue: &dyn JobQueue,
    poll: Duration,
) -> Result<QueueCounts, HeraldError> {
    loop {
        let counts = queue.counts_by_state().await?;
        if counts.is_settled() {
            return Ok(counts);
        }
        debug!(%counts, "waiting for queue to settle");
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, LogKind, LogOutcome};
    use crate::impls::InMemoryLogSink;
    use crate::ports::{Clock, DeliveryId, FixedClock, LogSink};
    use crate::queue::{InMemoryJobQueue, JobState};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails for listed phones, panics for "+panic", hangs for "+hang".
    #[derive(Default)]
    struct ScriptedSender {
        fail_for: Vec<String>,
        sent: Mutex<Vec<OutboundMessage>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageSender for ScriptedSender {
        async fn send(&self, message: &OutboundMessage) -> Result<DeliveryId, SendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match message.to.as_str() {
                "+panic" => panic!("sender blew up"),
                "+hang" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
                to if self.fail_for.iter().any(|f| f == to) => Err(SendError::Api {
                    status: 400,
                    message: "invalid To".into(),
                }),
                _ => {
                    self.sent.lock().unwrap().push(message.clone());
                    Ok(format!("SM{n}"))
                }
            }
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn job(id: &str, phone: &str, media: Option<&str>) -> Job {
        Job::new(
            JobId::from(id),
            0,
            phone,
            Some("Asha".into()),
            media.map(str::to_string),
            start().fixed_offset(),
        )
    }

    struct Harness {
        queue: Arc<InMemoryJobQueue>,
        log: Arc<InMemoryLogSink>,
        clock: Arc<FixedClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(FixedClock::new(start()));
        let log = Arc::new(InMemoryLogSink::new());
        let queue = Arc::new(
            InMemoryJobQueue::new(clock.clone() as Arc<dyn Clock>, log.clone() as Arc<dyn LogSink>)
                .with_poll_interval(Duration::from_millis(10)),
        );
        Harness { queue, log, clock }
    }

    fn fast_settings() -> DispatchSettings {
        DispatchSettings {
            send_timeout: Duration::from_millis(200),
            ..DispatchSettings::default()
        }
    }

    async fn settle(queue: &InMemoryJobQueue) -> QueueCounts {
        tokio::time::timeout(
            Duration::from_secs(5),
            wait_until_settled(queue, Duration::from_millis(5)),
        )
        .await
        .unwrap()
        .unwrap()
    }

    #[test]
    fn body_uses_template() {
        let job = job("a", "+919876543210", None);
        assert_eq!(render_body(DEFAULT_BODY_TEMPLATE, &job), "Hello Asha");
        assert_eq!(render_body("Hi {name}, this is for {phone}", &job), "Hi Asha, this is for +919876543210");

        let nameless = Job::new(JobId::from("b"), 0, "+1", None, None, start().fixed_offset());
        assert_eq!(render_body(DEFAULT_BODY_TEMPLATE, &nameless), "Hello");
    }

    #[test]
    fn media_urls_must_be_http() {
        assert!(is_public_media_url("https://cdn.example.com/a.png"));
        assert!(is_public_media_url("HTTP://cdn.example.com/a.png"));
        assert!(!is_public_media_url("C:\\scans\\a.png"));
        assert!(!is_public_media_url("ftp://x/a.png"));
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_next_job() {
        let h = harness();
        let sender = Arc::new(ScriptedSender {
            fail_for: vec!["+911111111111".into()],
            ..Default::default()
        });

        h.queue.enqueue(job("bad", "+911111111111", None)).await.unwrap();
        h.queue.enqueue(job("good", "+922222222222", None)).await.unwrap();

        let dispatcher = Dispatcher::spawn(
            h.queue.clone(),
            sender.clone(),
            Arc::new(Pacing::new(0.0).unwrap()),
            fast_settings(),
        );
        let counts = settle(&h.queue).await;
        dispatcher.shutdown_and_join().await;

        assert_eq!(counts.failed, 1);
        assert_eq!(counts.delivered, 1);

        let delivered = h.log.entries(Some(LogKind::Delivered));
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].job_id.as_str(), "good");

        let failed = h.log.entries(Some(LogKind::Failed));
        assert!(matches!(&failed[0].outcome, LogOutcome::Failed { error } if error.contains("invalid To")));
    }

    #[tokio::test]
    async fn refusals_never_reach_the_sender() {
        let h = harness();
        let sender = Arc::new(ScriptedSender::default());

        h.queue.enqueue(job("no-phone", "", None)).await.unwrap();
        h.queue
            .enqueue(job("local-file", "+919876543210", Some("scans/a.png")))
            .await
            .unwrap();

        let dispatcher = Dispatcher::spawn(
            h.queue.clone(),
            sender.clone(),
            Arc::new(Pacing::new(0.0).unwrap()),
            fast_settings(),
        );
        let counts = settle(&h.queue).await;
        dispatcher.shutdown_and_join().await;

        assert_eq!(counts.failed, 2);
        assert_eq!(sender.calls.load(Ordering::SeqCst), 0);

        let errors: Vec<String> = h
            .log
            .entries(Some(LogKind::Failed))
            .into_iter()
            .filter_map(|e| match e.outcome {
                LogOutcome::Failed { error } => Some(error),
                _ => None,
            })
            .collect();
        assert!(errors[0].contains("no recipient phone number"));
        assert!(errors[1].contains("public http(s) URL"));
    }

    #[tokio::test]
    async fn panics_and_timeouts_become_failures() {
        let h = harness();
        let sender = Arc::new(ScriptedSender::default());

        h.queue.enqueue(job("p", "+panic", None)).await.unwrap();
        h.queue.enqueue(job("h", "+hang", None)).await.unwrap();
        h.queue.enqueue(job("ok", "+919876543210", None)).await.unwrap();

        let dispatcher = Dispatcher::spawn(
            h.queue.clone(),
            sender.clone(),
            Arc::new(Pacing::new(0.0).unwrap()),
            fast_settings(),
        );
        let counts = settle(&h.queue).await;
        dispatcher.shutdown_and_join().await;

        assert_eq!(counts.failed, 2);
        assert_eq!(counts.delivered, 1);
        let record = h.queue.record(&JobId::from("h")).await.unwrap();
        assert!(record.last_error.unwrap().contains("timed out"));
        let record = h.queue.record(&JobId::from("p")).await.unwrap();
        assert!(record.last_error.unwrap().contains("crashed"));
    }

    #[tokio::test]
    async fn late_promotion_misses_the_window() {
        let h = harness();
        let sender = Arc::new(ScriptedSender::default());

        let future = Job::new(
            JobId::from("late"),
            0,
            "+919876543210",
            None,
            None,
            (start() + TimeDelta::seconds(10)).fixed_offset(),
        );
        h.queue.enqueue(future).await.unwrap();

        // The dispatcher was not running while the job came due.
        h.clock.advance(TimeDelta::minutes(5));

        let dispatcher = Dispatcher::spawn(
            h.queue.clone(),
            sender.clone(),
            Arc::new(Pacing::new(0.0).unwrap()),
            fast_settings(),
        );
        let counts = settle(&h.queue).await;
        dispatcher.shutdown_and_join().await;

        assert_eq!(counts.failed, 1);
        assert_eq!(sender.calls.load(Ordering::SeqCst), 0);
        let record = h.queue.record(&JobId::from("late")).await.unwrap();
        assert!(record.last_error.unwrap().contains("missed its send window"));
    }

    #[tokio::test]
    async fn grace_none_sends_late_jobs() {
        let h = harness();
        let sender = Arc::new(ScriptedSender::default());
        let future = Job::new(
            JobId::from("late"),
            0,
            "+919876543210",
            None,
            None,
            (start() + TimeDelta::seconds(10)).fixed_offset(),
        );
        h.queue.enqueue(future).await.unwrap();
        h.clock.advance(TimeDelta::minutes(5));

        let settings = DispatchSettings {
            grace: None,
            ..fast_settings()
        };
        let dispatcher = Dispatcher::spawn(
            h.queue.clone(),
            sender.clone(),
            Arc::new(Pacing::new(0.0).unwrap()),
            settings,
        );
        let counts = settle(&h.queue).await;
        dispatcher.shutdown_and_join().await;
        assert_eq!(counts.delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_delay_separates_sends() {
        let h = harness();
        let sender = Arc::new(ScriptedSender::default());
        h.queue.enqueue(job("a", "+911111111111", None)).await.unwrap();
        h.queue.enqueue(job("b", "+922222222222", None)).await.unwrap();

        let dispatcher = Dispatcher::spawn(
            h.queue.clone(),
            sender.clone(),
            Arc::new(Pacing::new(10.0).unwrap()),
            fast_settings(),
        );

        // First send goes out immediately, the second waits out the delay.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sender.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sender.calls.load(Ordering::SeqCst), 2);

        dispatcher.shutdown_and_join().await;
    }

    /// Wall clock that follows tokio's (pausable) timer.
    struct TokioClock {
        origin: tokio::time::Instant,
        origin_utc: DateTime<Utc>,
    }

    impl Clock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap();
            self.origin_utc + elapsed
        }
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_due_during_pacing_are_still_sent() {
        struct TwoSecondSender;

        #[async_trait]
        impl MessageSender for TwoSecondSender {
            async fn send(&self, _: &OutboundMessage) -> Result<DeliveryId, SendError> {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok("SM-ok".into())
            }
        }

        let clock: Arc<dyn Clock> = Arc::new(TokioClock {
            origin: tokio::time::Instant::now(),
            origin_utc: start(),
        });
        let log = Arc::new(InMemoryLogSink::new());
        let queue = Arc::new(InMemoryJobQueue::new(clock, log.clone() as Arc<dyn LogSink>));

        queue.enqueue(job("a", "+911111111111", None)).await.unwrap();
        let b = Job::new(
            JobId::from("b"),
            1,
            "+922222222222",
            None,
            None,
            (start() + TimeDelta::seconds(1)).fixed_offset(),
        );
        queue.enqueue(b).await.unwrap();

        // "b" is due 1s in, while "a" takes 2s to send and then 60s of pacing.
        let dispatcher = Dispatcher::spawn(
            queue.clone(),
            Arc::new(TwoSecondSender),
            Arc::new(Pacing::new(60.0).unwrap()),
            DispatchSettings::default(),
        );
        let counts = tokio::time::timeout(
            Duration::from_secs(600),
            wait_until_settled(queue.as_ref(), Duration::from_millis(100)),
        )
        .await
        .unwrap()
        .unwrap();
        dispatcher.shutdown_and_join().await;

        assert_eq!(counts.delivered, 2, "{:?}", log.entries(Some(LogKind::Failed)));
        assert_eq!(counts.failed, 0);
        let b = queue.record(&JobId::from("b")).await.unwrap();
        assert_eq!(b.state, JobState::Delivered);
    }

    #[tokio::test]
    async fn shutdown_lets_in_flight_send_finish() {
        struct SlowSender;

        #[async_trait]
        impl MessageSender for SlowSender {
            async fn send(&self, _: &OutboundMessage) -> Result<DeliveryId, SendError> {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok("SM-slow".into())
            }
        }

        let h = harness();
        h.queue.enqueue(job("a", "+911111111111", None)).await.unwrap();
        h.queue.enqueue(job("b", "+922222222222", None)).await.unwrap();

        let dispatcher = Dispatcher::spawn(
            h.queue.clone(),
            Arc::new(SlowSender),
            Arc::new(Pacing::new(0.0).unwrap()),
            fast_settings(),
        );

        // Wait until the first job is in flight, then ask to stop.
        loop {
            if h.queue.counts_by_state().await.unwrap().sending == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        dispatcher.shutdown_and_join().await;

        let a = h.queue.record(&JobId::from("a")).await.unwrap();
        let b = h.queue.record(&JobId::from("b")).await.unwrap();
        assert_eq!(a.state, JobState::Delivered);
        assert_eq!(b.state, JobState::Scheduled);
    }
}
