use crate::service::{PoseService, LATEST};
use crate::types::{FramePair, Pose, PoseData, PoseStatus, ServiceEvent};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capacity of the diagnostic event channel between service callbacks and the frame loop.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Sample the device pose for the current frame.
///
/// Queries the pose at `frame_timestamp` (the last camera frame) and at
/// [`LATEST`]. The frame-synchronised pose wins when valid so video and
/// overlay stay aligned; the latest pose covers frames whose timestamp the
/// service cannot serve yet. Returns `None` when neither is usable.
pub fn sample_latest_pose<S: PoseService + ?Sized>(
    service: &S,
    is_localized: bool,
    frame_timestamp: f64,
) -> Option<Pose> {
    let pair = FramePair::device(is_localized);

    let latest = usable(service.pose_at_time(LATEST, pair), "latest");
    let at_frame = usable(service.pose_at_time(frame_timestamp, pair), "frame");

    match (at_frame, latest) {
        (Some(data), _) | (None, Some(data)) => Some(Pose::from(&data)),
        (None, None) => {
            log::debug!(
                "No valid pose for {} (frame t={:.6}), keeping previous transform",
                pair,
                frame_timestamp
            );
            None
        }
    }
}

fn usable(result: crate::Result<PoseData>, label: &str) -> Option<PoseData> {
    match result {
        Ok(data) if data.is_valid() => Some(data),
        Ok(data) => {
            log::trace!("{} pose rejected: status {}", label, status_label(data.status));
            None
        }
        Err(e) => {
            log::trace!("{} pose query failed: {}", label, e);
            None
        }
    }
}

/// Human-readable name of a pose status.
pub fn status_label(status: PoseStatus) -> &'static str {
    match status {
        PoseStatus::Initializing => "Initializing",
        PoseStatus::Valid => "Valid",
        PoseStatus::Invalid => "Invalid",
        PoseStatus::Unknown => "Unknown",
    }
}

/// Localization snapshot shared between the pose callback and the frame loop.
///
/// The callback is the only writer; the frame loop reads it once per frame.
#[derive(Debug, Clone, Default)]
pub struct LocalizationFlag {
    localized: Arc<AtomicBool>,
}

impl LocalizationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_localized(&self) -> bool {
        self.localized.load(Ordering::Acquire)
    }

    /// Pose-available callback body for the localization-check pair.
    pub fn on_pose_available(&self, pose: &PoseData) {
        let localized = pose.is_valid();
        let was = self.localized.swap(localized, Ordering::AcqRel);
        if was != localized {
            if localized {
                log::info!("Localized against area description");
            } else {
                log::info!("Lost localization ({})", status_label(pose.status));
            }
        }
    }
}

/// Writer side of the diagnostic event feed, moved into the event callback.
///
/// Holds a receiver clone so a full channel can evict its oldest entry.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Sender<String>,
    evict: Receiver<String>,
}

impl EventSink {
    /// Event callback body: forward `"key: value"` to the frame loop.
    ///
    /// When the channel is full the oldest pending event is dropped, so the
    /// newest event always reaches the reader.
    pub fn on_event(&self, event: &ServiceEvent) {
        let mut message = event.to_string();
        loop {
            match self.sender.try_send(message) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(oldest) = self.evict.try_recv() {
                        log::trace!("Event channel full, dropping {}", oldest);
                    }
                    message = rejected;
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::trace!("Event channel disconnected");
                    return;
                }
            }
        }
    }
}

/// Reader side of the diagnostic event feed, owned by the frame loop.
#[derive(Debug)]
pub struct EventFeed {
    receiver: Receiver<String>,
    latest: Option<String>,
}

impl EventFeed {
    pub fn channel() -> (EventSink, EventFeed) {
        let (sender, receiver) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
        (
            EventSink {
                sender,
                evict: receiver.clone(),
            },
            EventFeed {
                receiver,
                latest: None,
            },
        )
    }

    /// Drain pending events, keeping the newest. Returns the latest event seen so far.
    pub fn poll(&mut self) -> Option<&str> {
        while let Ok(event) = self.receiver.try_recv() {
            log::debug!("Pose service event: {}", event);
            self.latest = Some(event);
        }
        self.latest.as_deref()
    }

    pub fn latest(&self) -> Option<&str> {
        self.latest.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ScriptedService;
    use crate::types::CoordinateFrame;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const FRAME_T: f64 = 12.5;

    fn pose(status: PoseStatus, pair: FramePair, timestamp: f64, x: f64) -> PoseData {
        PoseData {
            status,
            timestamp,
            frame: pair,
            translation: [x, 0.0, 0.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }

    #[test]
    fn test_frame_pose_preferred() {
        let pair = FramePair::device(false);
        let mut service = ScriptedService::new();
        service.script_pose(LATEST, pair, pose(PoseStatus::Valid, pair, 13.0, 1.0));
        service.script_pose(FRAME_T, pair, pose(PoseStatus::Valid, pair, FRAME_T, 2.0));

        let sampled = sample_latest_pose(&service, false, FRAME_T).unwrap();
        assert_eq!(sampled.timestamp, FRAME_T);
        assert_relative_eq!(sampled.translation, Vector3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_latest_used_when_frame_pose_invalid() {
        let pair = FramePair::device(false);
        let mut service = ScriptedService::new();
        service.script_pose(LATEST, pair, pose(PoseStatus::Valid, pair, 13.0, 1.0));
        service.script_pose(FRAME_T, pair, pose(PoseStatus::Invalid, pair, FRAME_T, 2.0));

        let sampled = sample_latest_pose(&service, false, FRAME_T).unwrap();
        assert_eq!(sampled.timestamp, 13.0);
        assert_relative_eq!(sampled.translation, Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_latest_used_when_frame_query_fails() {
        let pair = FramePair::device(false);
        let mut service = ScriptedService::new();
        service.script_pose(LATEST, pair, pose(PoseStatus::Valid, pair, 13.0, 1.0));

        let sampled = sample_latest_pose(&service, false, FRAME_T).unwrap();
        assert_eq!(sampled.timestamp, 13.0);
    }

    #[test]
    fn test_unavailable_when_both_invalid() {
        let pair = FramePair::device(false);
        let mut service = ScriptedService::new();
        service.script_pose(LATEST, pair, pose(PoseStatus::Initializing, pair, 13.0, 1.0));
        service.script_pose(FRAME_T, pair, pose(PoseStatus::Invalid, pair, FRAME_T, 2.0));

        assert!(sample_latest_pose(&service, false, FRAME_T).is_none());
    }

    #[test]
    fn test_localized_queries_area_description() {
        let start = FramePair::device(false);
        let map = FramePair::device(true);
        let mut service = ScriptedService::new();
        service.script_pose(LATEST, start, pose(PoseStatus::Valid, start, 1.0, 1.0));
        service.script_pose(LATEST, map, pose(PoseStatus::Valid, map, 1.0, 5.0));

        let sampled = sample_latest_pose(&service, true, FRAME_T).unwrap();
        assert_eq!(sampled.frame.base, CoordinateFrame::AreaDescription);
        assert_relative_eq!(sampled.translation.x, 5.0);
    }

    #[test]
    fn test_localization_flag_follows_status() {
        let flag = LocalizationFlag::new();
        let pair = FramePair::localization_check();
        assert!(!flag.is_localized());

        flag.on_pose_available(&pose(PoseStatus::Valid, pair, 0.0, 0.0));
        assert!(flag.is_localized());

        flag.on_pose_available(&pose(PoseStatus::Invalid, pair, 0.0, 0.0));
        assert!(!flag.is_localized());
    }

    #[test]
    fn test_localization_flag_across_threads() {
        let flag = LocalizationFlag::new();
        let writer = flag.clone();
        let pair = FramePair::localization_check();
        std::thread::spawn(move || {
            writer.on_pose_available(&pose(PoseStatus::Valid, pair, 0.0, 0.0));
        })
        .join()
        .unwrap();
        assert!(flag.is_localized());
    }

    #[test]
    fn test_event_feed_keeps_newest() {
        let (sink, mut feed) = EventFeed::channel();
        assert_eq!(feed.poll(), None);

        sink.on_event(&ServiceEvent {
            key: "TooFewFeaturesTracked".into(),
            value: "true".into(),
        });
        sink.on_event(&ServiceEvent {
            key: "FisheyeUnderExposed".into(),
            value: "false".into(),
        });
        assert_eq!(feed.poll(), Some("FisheyeUnderExposed: false"));
        assert_eq!(feed.poll(), Some("FisheyeUnderExposed: false"));
    }

    #[test]
    fn test_event_sink_keeps_newest_when_full() {
        let (sink, mut feed) = EventFeed::channel();
        for i in 0..EVENT_CHANNEL_CAPACITY + 10 {
            sink.on_event(&ServiceEvent {
                key: "n".into(),
                value: i.to_string(),
            });
        }
        let expected = format!("n: {}", EVENT_CHANNEL_CAPACITY + 9);
        assert_eq!(feed.poll(), Some(expected.as_str()));
        assert_eq!(feed.receiver.len(), 0);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(status_label(PoseStatus::Valid), "Valid");
        assert_eq!(status_label(PoseStatus::Initializing), "Initializing");
    }
}
