use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tokio::time::MissedTickBehavior;

use crate::{
    config::{ClientConfig, MAX_CLIP_DURATION, MIN_CLIP_DURATION},
    error::{ClipmarkError, Result, ValidationError},
    markers::{TimestampMarker, scan_markers},
    service::ClipService,
    types::{ExtractionRequest, ExtractionResult, JobStatus, SubmitResponse},
};

/// What the user filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionForm {
    pub video_url: String,
    pub timestamps_input: String,
    pub clip_duration: u32,
}

/// A form that passed local validation, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedExtraction {
    pub request: ExtractionRequest,
    pub markers: Vec<TimestampMarker>,
}

impl ExtractionForm {
    pub fn validate(&self) -> std::result::Result<PreparedExtraction, ValidationError> {
        let video_url = self.video_url.trim();
        if video_url.is_empty() {
            return Err(ValidationError::MissingVideoUrl);
        }
        if self.timestamps_input.trim().is_empty() {
            return Err(ValidationError::MissingTimestamps);
        }
        if !(MIN_CLIP_DURATION..=MAX_CLIP_DURATION).contains(&self.clip_duration) {
            return Err(ValidationError::ClipDurationOutOfRange {
                value: self.clip_duration,
                min: MIN_CLIP_DURATION,
                max: MAX_CLIP_DURATION,
            });
        }

        let scan = scan_markers(&self.timestamps_input);
        if let Some(bad) = scan.first_blocking() {
            return Err(ValidationError::MalformedClock {
                line: bad.line,
                clock: bad.clock.clone(),
            });
        }
        if scan.markers.is_empty() {
            return Err(ValidationError::NoMarkersFound);
        }

        Ok(PreparedExtraction {
            request: ExtractionRequest {
                video_url: video_url.to_string(),
                timestamps_input: self.timestamps_input.clone(),
                clip_duration: self.clip_duration,
            },
            markers: scan.markers,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionUpdate {
    Queued { task_id: String },
    /// Server supplied progress, passed through untouched.
    Progress {
        progress: u32,
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Hard ceiling on the whole poll loop.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
        }
    }
}

impl From<&ClientConfig> for PollPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.poll_timeout(),
        }
    }
}

/// Releases the in-flight slot however the run ends, including when the
/// run future is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Submits extraction jobs and follows them to a terminal state, one at a time.
pub struct Extractor<C> {
    service: C,
    policy: PollPolicy,
    in_flight: AtomicBool,
}

/// A result only counts as a success when the server says so or, lacking a
/// `success` flag, when it carries no error.
fn check_result(result: ExtractionResult) -> Result<ExtractionResult> {
    let failed = match result.success {
        Some(success) => !success,
        None => result.error.is_some(),
    };
    if failed {
        return Err(ClipmarkError::JobFailed(
            result
                .error
                .unwrap_or_else(|| "no clips were produced".to_string()),
        ));
    }
    Ok(result)
}

impl<C: ClipService> Extractor<C> {
    pub fn new(service: C, policy: PollPolicy) -> Self {
        Self {
            service,
            policy,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn service(&self) -> &C {
        &self.service
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlightGuard(&self.in_flight))
            .map_err(|_| ClipmarkError::AlreadyRunning)
    }

    /// Validate, submit and follow a job until it completes, fails or the
    /// poll ceiling is hit.
    pub async fn run(
        &self,
        form: &ExtractionForm,
        mut on_update: impl FnMut(ExtractionUpdate),
    ) -> Result<ExtractionResult> {
        let prepared = form.validate()?;
        let _guard = self.acquire()?;

        tracing::info!(
            markers = prepared.markers.len(),
            clip_duration = prepared.request.clip_duration,
            "submitting extraction"
        );
        let task_id = match self.service.submit(&prepared.request).await? {
            SubmitResponse::Immediate(result) => return check_result(result),
            SubmitResponse::Queued { task_id } => task_id,
        };
        on_update(ExtractionUpdate::Queued {
            task_id: task_id.clone(),
        });

        match tokio::time::timeout(self.policy.timeout, self.poll(&task_id, &mut on_update)).await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%task_id, "extraction poll timed out");
                Err(ClipmarkError::Timeout {
                    after: self.policy.timeout,
                })
            }
        }
    }

    async fn poll(
        &self,
        task_id: &str,
        on_update: &mut impl FnMut(ExtractionUpdate),
    ) -> Result<ExtractionResult> {
        let mut ticker = tokio::time::interval(self.policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let progress = match self.service.progress(task_id).await {
                Ok(progress) => progress,
                Err(e) => {
                    tracing::warn!(%task_id, error = %e, "progress poll failed");
                    continue;
                }
            };
            tracing::debug!(%task_id, status = ?progress.status, progress = progress.progress, "polled");

            match progress.status {
                JobStatus::Completed => {
                    let result = progress.results.ok_or_else(|| ClipmarkError::MissingResults {
                        task_id: task_id.to_string(),
                    })?;
                    return check_result(result);
                }
                JobStatus::Failed => {
                    return Err(ClipmarkError::JobFailed(
                        progress.error.unwrap_or_else(|| "unknown error".to_string()),
                    ));
                }
                _ => on_update(ExtractionUpdate::Progress {
                    progress: progress.progress,
                    message: progress.message,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use tokio::time::Instant;

    use super::*;
    use crate::types::{ClipResult, JobProgress};

    enum Step {
        Status(JobProgress),
        TransportError,
    }

    struct FakeClips {
        submit_reply: SubmitResponse,
        steps: Mutex<VecDeque<Step>>,
        submits: AtomicUsize,
        polls: AtomicUsize,
    }

    impl FakeClips {
        fn queued(steps: Vec<Step>) -> Self {
            Self {
                submit_reply: SubmitResponse::Queued {
                    task_id: "task-1".to_string(),
                },
                steps: Mutex::new(steps.into()),
                submits: AtomicUsize::new(0),
                polls: AtomicUsize::new(0),
            }
        }
    }

    impl ClipService for FakeClips {
        async fn submit(&self, _request: &ExtractionRequest) -> Result<SubmitResponse> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(self.submit_reply.clone())
        }

        async fn progress(&self, _task_id: &str) -> Result<JobProgress> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            // an exhausted script keeps the job processing forever
            match self.steps.lock().unwrap().pop_front() {
                Some(Step::Status(progress)) => Ok(progress),
                Some(Step::TransportError) => Err(ClipmarkError::Server {
                    status: 502,
                    message: "bad gateway".to_string(),
                }),
                None => Ok(status(JobStatus::Processing, 50)),
            }
        }
    }

    fn status(status: JobStatus, progress: u32) -> JobProgress {
        JobProgress {
            status,
            progress,
            message: None,
            results: None,
            error: None,
        }
    }

    fn completed(results: ExtractionResult) -> JobProgress {
        JobProgress {
            results: Some(results),
            ..status(JobStatus::Completed, 100)
        }
    }

    fn form(url: &str) -> ExtractionForm {
        ExtractionForm {
            video_url: url.to_string(),
            timestamps_input: "0:15:43 Stream Time Marker - Momento epico\n1:02:45 Stream Time Marker"
                .to_string(),
            clip_duration: 60,
        }
    }

    fn sample_result() -> ExtractionResult {
        ExtractionResult {
            success: Some(true),
            successful_clips: 1,
            total_size_mb: 12.5,
            download_url: Some("/api/download/task-1".to_string()),
            zip_filename: Some("timestamp_clips_task-1.zip".to_string()),
            clips: vec![ClipResult {
                success: true,
                filename: Some("clip_1.mp4".to_string()),
                timestamp: Some(943.0),
                start_time: Some(883.0),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_prepares_request() {
        let prepared = form("  https://www.twitch.tv/videos/1  ").validate().unwrap();
        assert_eq!(prepared.request.video_url, "https://www.twitch.tv/videos/1");
        assert_eq!(prepared.request.clip_duration, 60);
        assert_eq!(prepared.markers.len(), 2);
    }

    #[test]
    fn test_validate_errors() {
        let mut f = form("https://x");
        f.timestamps_input = "   ".to_string();
        assert_eq!(f.validate(), Err(ValidationError::MissingTimestamps));

        f.timestamps_input = "just chatting".to_string();
        assert_eq!(f.validate(), Err(ValidationError::NoMarkersFound));

        f.timestamps_input = "0:75:00 Stream Time Marker - late".to_string();
        assert_eq!(
            f.validate(),
            Err(ValidationError::MalformedClock {
                line: 1,
                clock: "0:75:00".to_string()
            })
        );

        let mut f = form("https://x");
        f.clip_duration = 5;
        assert!(matches!(
            f.validate(),
            Err(ValidationError::ClipDurationOutOfRange { value: 5, .. })
        ));
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut f = form("https://x");
        f.timestamps_input =
            "15:43 Stream Time Marker - mm:ss line\n0:10:00 Stream Time Marker - good".to_string();
        let prepared = f.validate().unwrap();
        assert_eq!(prepared.markers.len(), 1);
        assert_eq!(prepared.markers[0].original, "0:10:00");
        assert_eq!(prepared.markers[0].line, 2);
    }

    #[tokio::test]
    async fn test_empty_url_never_hits_network() {
        let extractor = Extractor::new(FakeClips::queued(vec![]), PollPolicy::default());
        let err = extractor.run(&form("   "), |_| {}).await.unwrap_err();
        assert!(matches!(
            err,
            ClipmarkError::Validation(ValidationError::MissingVideoUrl)
        ));
        assert_eq!(extractor.service().submits.load(Ordering::SeqCst), 0);
        assert!(!extractor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_completed() {
        let fake = FakeClips::queued(vec![
            Step::Status(status(JobStatus::Starting, 0)),
            Step::Status(status(JobStatus::Processing, 40)),
            Step::Status(completed(sample_result())),
        ]);
        let extractor = Extractor::new(fake, PollPolicy::default());

        let start = Instant::now();
        let mut updates = Vec::new();
        let result = extractor
            .run(&form("https://x"), |u| updates.push(u))
            .await
            .unwrap();

        assert_eq!(result, sample_result());
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(
            updates,
            vec![
                ExtractionUpdate::Queued {
                    task_id: "task-1".to_string()
                },
                ExtractionUpdate::Progress {
                    progress: 0,
                    message: None
                },
                ExtractionUpdate::Progress {
                    progress: 40,
                    message: None
                },
            ]
        );
        assert!(!extractor.is_running());
    }

    #[tokio::test]
    async fn test_immediate_result_skips_polling() {
        let mut fake = FakeClips::queued(vec![]);
        fake.submit_reply = SubmitResponse::Immediate(sample_result());
        let extractor = Extractor::new(fake, PollPolicy::default());

        let mut updates = Vec::new();
        let result = extractor
            .run(&form("https://x"), |u| updates.push(u))
            .await
            .unwrap();
        assert_eq!(result.successful_clips, 1);
        assert!(updates.is_empty());
        assert_eq!(extractor.service().polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_immediate_error_body_is_failure() {
        let mut fake = FakeClips::queued(vec![]);
        fake.submit_reply = serde_json::from_str(r#"{"error":"x"}"#).unwrap();
        assert!(matches!(fake.submit_reply, SubmitResponse::Immediate(_)));
        let extractor = Extractor::new(fake, PollPolicy::default());

        let err = extractor.run(&form("https://x"), |_| {}).await.unwrap_err();
        assert!(matches!(err, ClipmarkError::JobFailed(ref m) if m == "x"));
        assert!(!extractor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_surfaces_server_error() {
        let fake = FakeClips::queued(vec![Step::Status(JobProgress {
            error: Some("yt-dlp exploded".to_string()),
            ..status(JobStatus::Failed, 0)
        })]);
        let extractor = Extractor::new(fake, PollPolicy::default());
        let err = extractor.run(&form("https://x"), |_| {}).await.unwrap_err();
        assert!(matches!(err, ClipmarkError::JobFailed(ref m) if m == "yt-dlp exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_success_is_failure() {
        let fake = FakeClips::queued(vec![Step::Status(completed(ExtractionResult {
            success: Some(false),
            error: Some("No valid timestamps found".to_string()),
            ..Default::default()
        }))]);
        let extractor = Extractor::new(fake, PollPolicy::default());
        let err = extractor.run(&form("https://x"), |_| {}).await.unwrap_err();
        assert!(matches!(err, ClipmarkError::JobFailed(ref m) if m.contains("timestamps")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_results() {
        let fake = FakeClips::queued(vec![Step::Status(status(JobStatus::Completed, 100))]);
        let extractor = Extractor::new(fake, PollPolicy::default());
        let err = extractor.run(&form("https://x"), |_| {}).await.unwrap_err();
        assert!(matches!(err, ClipmarkError::MissingResults { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_keep_polling() {
        let fake = FakeClips::queued(vec![
            Step::TransportError,
            Step::TransportError,
            Step::Status(completed(sample_result())),
        ]);
        let extractor = Extractor::new(fake, PollPolicy::default());
        let result = extractor.run(&form("https://x"), |_| {}).await.unwrap();
        assert_eq!(result.successful_clips, 1);
        assert_eq!(extractor.service().polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_terminal_times_out_at_ceiling() {
        let extractor = Extractor::new(FakeClips::queued(vec![]), PollPolicy::default());

        let start = Instant::now();
        let err = extractor.run(&form("https://x"), |_| {}).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, ClipmarkError::Timeout { after } if after == Duration::from_secs(600)));
        assert!(elapsed >= Duration::from_secs(600));
        assert!(elapsed < Duration::from_secs(602));
        assert!(extractor.service().polls.load(Ordering::SeqCst) >= 299);
        assert!(!extractor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_while_in_flight_is_refused() {
        let extractor = Extractor::new(
            FakeClips::queued(vec![]),
            PollPolicy {
                interval: Duration::from_secs(2),
                timeout: Duration::from_secs(10),
            },
        );
        let f = form("https://x");

        let (first, second) = tokio::join!(extractor.run(&f, |_| {}), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            extractor.run(&f, |_| {}).await
        });

        assert!(matches!(first, Err(ClipmarkError::Timeout { .. })));
        assert!(matches!(second, Err(ClipmarkError::AlreadyRunning)));
        assert_eq!(extractor.service().submits.load(Ordering::SeqCst), 1);

        // slot is free again once the first run is over
        let third = extractor.run(&f, |_| {}).await;
        assert!(matches!(third, Err(ClipmarkError::Timeout { .. })));
        assert_eq!(extractor.service().submits.load(Ordering::SeqCst), 2);
    }
}
