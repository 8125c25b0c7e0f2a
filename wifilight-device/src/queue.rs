//! Serialized command queue
//!
//! Commands are written strictly in FIFO order, one at a time. After a
//! successful write the queue waits the command's delay before the next one.
//! The queue itself never sleeps or performs I/O: the owning task asks
//! [`CommandQueue::poll`] what to do at a given instant and reports back with
//! [`CommandQueue::written`] or [`CommandQueue::failed`].

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;
use wifilight_transport::{Gap, Segment};

use crate::color::Rgbw;

/// One frame ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Resolved frame, checksum included
    pub frame: Vec<u8>,
    /// Zone the command addresses, if any
    pub channel: Option<u8>,
    /// Pause after the write before the next command
    pub delay: Duration,
    /// Status polls and other housekeeping, never skipped as stale
    pub control_only: bool,
    pub status_request: bool,
    /// Ordinary commands still queued after this instant are skipped
    pub deadline: Option<Instant>,
    /// Color the device shows once this command is written
    pub applies: Option<Rgbw>,
    in_progress: bool,
}

/// Per-call options of [`CommandQueue::push`]
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Time the whole call takes on the wire, split evenly over its timed
    /// segments. `None` keeps the family default after each of them.
    pub delay: Option<Duration>,
    pub control_only: bool,
    pub status_request: bool,
    pub deadline: Option<Instant>,
    pub applies: Option<Rgbw>,
}

impl QueueOptions {
    pub fn status_request() -> Self {
        Self {
            control_only: true,
            status_request: true,
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    /// The head has been handed out for writing
    Writing,
    AwaitingDelay { until: Instant },
}

/// What the owner should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Write this command, then call `written` or `failed`
    Write(Command),
    /// Nothing to do before this instant
    Wait(Instant),
    /// A write is outstanding
    Busy,
    /// Queue drained. `refresh` is set when the last ordinary command just
    /// retired and the device state should be re-read.
    Idle { refresh: bool },
}

pub struct CommandQueue {
    commands: VecDeque<Command>,
    state: DrainState,
    default_delay: Duration,
}

impl CommandQueue {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            commands: VecDeque::new(),
            state: DrainState::Idle,
            default_delay,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    /// When the owner has to poll again, if it is waiting on a delay
    pub fn wake_at(&self) -> Option<Instant> {
        match self.state {
            DrainState::AwaitingDelay { until } => Some(until),
            _ => None,
        }
    }

    /// Append the frames of one logical call.
    ///
    /// Segments followed by an immediate gap get a zero delay. The applied
    /// color is attached to the last frame only.
    pub fn push(&mut self, channel: Option<u8>, segments: Vec<Segment>, opts: &QueueOptions) {
        let last = segments.len().saturating_sub(1);
        let timed = segments.iter().filter(|s| s.gap == Gap::Timed).count().max(1) as u32;
        let timed_delay = opts.delay.map_or(self.default_delay, |d| d / timed);
        for (i, segment) in segments.into_iter().enumerate() {
            let delay = match segment.gap {
                Gap::Immediate => Duration::ZERO,
                Gap::Timed => timed_delay,
            };
            self.commands.push_back(Command {
                frame: segment.bytes,
                channel,
                delay,
                control_only: opts.control_only,
                status_request: opts.status_request,
                deadline: opts.deadline,
                applies: if i == last { opts.applies } else { None },
                in_progress: false,
            });
        }
    }

    /// Drop every pending command.
    ///
    /// A write already handed out stays accounted for: its delay is still
    /// honoured before anything new is written.
    pub fn clear(&mut self) {
        if !self.commands.is_empty() {
            trace!(dropped = self.commands.len(), "clearing command queue");
        }
        self.commands.clear();
    }

    /// Decide the next step at `now`
    pub fn poll(&mut self, now: Instant) -> Step {
        match self.state {
            DrainState::Writing => return Step::Busy,
            DrainState::AwaitingDelay { until } if now < until => return Step::Wait(until),
            _ => self.state = DrainState::Idle,
        }

        let mut refresh = false;
        while let Some(head) = self.commands.front() {
            let stale = !head.control_only && head.deadline.is_some_and(|d| d <= now);
            if !(head.in_progress || stale) {
                break;
            }
            if stale {
                trace!("skipping stale command");
            }
            if self.commands.len() == 1 && !head.status_request {
                refresh = true;
            }
            self.commands.pop_front();
        }

        match self.commands.front_mut() {
            None => Step::Idle { refresh },
            Some(head) => {
                head.in_progress = true;
                self.state = DrainState::Writing;
                Step::Write(head.clone())
            }
        }
    }

    /// The outstanding write succeeded; returns the end of its delay
    pub fn written(&mut self, now: Instant) -> Instant {
        let delay = self
            .commands
            .front()
            .filter(|c| c.in_progress)
            .map_or(Duration::ZERO, |c| c.delay);
        let until = now + delay;
        self.state = DrainState::AwaitingDelay { until };
        until
    }

    /// The outstanding write failed; nothing queued survives
    pub fn failed(&mut self) {
        self.commands.clear();
        self.state = DrainState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(bytes: &[u8]) -> Vec<Segment> {
        vec![Segment {
            bytes: bytes.to_vec(),
            gap: Gap::Timed,
        }]
    }

    fn write(q: &mut CommandQueue, now: Instant) -> Vec<u8> {
        match q.poll(now) {
            Step::Write(cmd) => {
                q.written(now);
                cmd.frame
            }
            other => panic!("expected a write, got {:?}", other),
        }
    }

    #[test]
    fn test_fifo_order_and_delay() {
        let t0 = Instant::now();
        let mut q = CommandQueue::new(Duration::from_millis(10));
        for b in 1..=3u8 {
            q.push(None, seg(&[b]), &QueueOptions::default());
        }

        assert_eq!(write(&mut q, t0), vec![1]);
        // Still inside the delay of the first command
        assert_eq!(q.poll(t0 + Duration::from_millis(5)), Step::Wait(t0 + Duration::from_millis(10)));
        assert_eq!(write(&mut q, t0 + Duration::from_millis(10)), vec![2]);
        assert_eq!(write(&mut q, t0 + Duration::from_millis(20)), vec![3]);
        assert_eq!(q.poll(t0 + Duration::from_millis(30)), Step::Idle { refresh: true });
        assert!(q.is_empty());
    }

    #[test]
    fn test_poll_while_writing_is_busy() {
        let t0 = Instant::now();
        let mut q = CommandQueue::new(Duration::from_millis(10));
        q.push(None, seg(&[1]), &QueueOptions::default());
        assert!(matches!(q.poll(t0), Step::Write(_)));
        q.push(None, seg(&[2]), &QueueOptions::default());
        assert_eq!(q.poll(t0), Step::Busy);
    }

    #[test]
    fn test_clear_keeps_outstanding_delay() {
        let t0 = Instant::now();
        let mut q = CommandQueue::new(Duration::from_millis(10));
        q.push(None, seg(&[1]), &QueueOptions::default());
        q.push(None, seg(&[2]), &QueueOptions::default());
        assert_eq!(write(&mut q, t0), vec![1]);

        q.clear();
        q.push(None, seg(&[9]), &QueueOptions::default());
        assert_eq!(q.poll(t0), Step::Wait(t0 + Duration::from_millis(10)));
        assert_eq!(write(&mut q, t0 + Duration::from_millis(10)), vec![9]);
    }

    #[test]
    fn test_immediate_gap_has_no_delay() {
        let t0 = Instant::now();
        let mut q = CommandQueue::new(Duration::from_millis(100));
        let segments = vec![
            Segment {
                bytes: vec![1],
                gap: Gap::Immediate,
            },
            Segment {
                bytes: vec![2],
                gap: Gap::Timed,
            },
        ];
        q.push(Some(2), segments, &QueueOptions::default());
        assert_eq!(write(&mut q, t0), vec![1]);
        assert_eq!(write(&mut q, t0), vec![2]);
        assert_eq!(q.wake_at(), Some(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_explicit_delay_is_split_over_segments() {
        let t0 = Instant::now();
        let mut q = CommandQueue::new(Duration::from_millis(100));
        let segments = (1..=3u8)
            .map(|b| Segment {
                bytes: vec![b],
                gap: Gap::Timed,
            })
            .collect();
        q.push(None, segments, &QueueOptions::with_delay(Duration::from_millis(330)));

        assert_eq!(write(&mut q, t0), vec![1]);
        assert_eq!(q.wake_at(), Some(t0 + Duration::from_millis(110)));
        assert_eq!(write(&mut q, t0 + Duration::from_millis(110)), vec![2]);
        assert_eq!(write(&mut q, t0 + Duration::from_millis(220)), vec![3]);
        assert_eq!(q.wake_at(), Some(t0 + Duration::from_millis(330)));
    }

    #[test]
    fn test_stale_commands_are_skipped() {
        let t0 = Instant::now();
        let mut q = CommandQueue::new(Duration::from_millis(10));
        let stale = QueueOptions {
            deadline: Some(t0 + Duration::from_millis(5)),
            ..Default::default()
        };
        q.push(None, seg(&[1]), &stale);
        q.push(None, seg(&[2]), &stale);
        q.push(None, seg(&[3]), &QueueOptions::default());

        assert_eq!(write(&mut q, t0 + Duration::from_millis(50)), vec![3]);
    }

    #[test]
    fn test_status_requests_are_never_stale() {
        let t0 = Instant::now();
        let mut q = CommandQueue::new(Duration::from_millis(10));
        let opts = QueueOptions {
            deadline: Some(t0),
            ..QueueOptions::status_request()
        };
        q.push(None, seg(&[0x81]), &opts);
        assert_eq!(write(&mut q, t0 + Duration::from_secs(1)), vec![0x81]);
        // Retiring a status request does not ask for another one
        assert_eq!(
            q.poll(t0 + Duration::from_secs(2)),
            Step::Idle { refresh: false }
        );
    }

    #[test]
    fn test_failed_write_drops_queue() {
        let t0 = Instant::now();
        let mut q = CommandQueue::new(Duration::from_millis(10));
        q.push(None, seg(&[1]), &QueueOptions::default());
        q.push(None, seg(&[2]), &QueueOptions::default());
        assert!(matches!(q.poll(t0), Step::Write(_)));
        q.failed();
        assert!(q.is_empty());
        assert_eq!(q.state(), DrainState::Idle);
    }

    #[test]
    fn test_applies_only_on_last_segment() {
        let t0 = Instant::now();
        let mut q = CommandQueue::new(Duration::from_millis(10));
        let segments = vec![
            Segment {
                bytes: vec![1],
                gap: Gap::Timed,
            },
            Segment {
                bytes: vec![2],
                gap: Gap::Timed,
            },
        ];
        let opts = QueueOptions {
            applies: Some(Rgbw::rgb(1, 2, 3)),
            ..Default::default()
        };
        q.push(None, segments, &opts);
        match q.poll(t0) {
            Step::Write(cmd) => assert_eq!(cmd.applies, None),
            other => panic!("{:?}", other),
        }
        q.written(t0);
        match q.poll(t0 + Duration::from_millis(10)) {
            Step::Write(cmd) => assert_eq!(cmd.applies, Some(Rgbw::rgb(1, 2, 3))),
            other => panic!("{:?}", other),
        }
    }
}
