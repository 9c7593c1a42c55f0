//! Single-slot event mailbox.
//!
//! A mailbox holds only the most recent event of one kind. Each publish
//! overwrites the previous value whether or not it was read. There is no
//! queue and nothing to drain.
//!
//! # Thread Safety
//!
//! - **Writes**: single writer. Each source is fed by the dispatcher of the
//!   one line that owns it, so publishes to a mailbox never overlap.
//! - **Reads**: lock-free, any number of readers, using the seqlock pattern
//!   with an epoch counter. The epoch is odd while a write is in progress;
//!   readers retry if they see an odd epoch or if it changed during the read.
//! - The payload is stored before the sequence number, and the sequence
//!   number is stored with Release ordering, so a reader that observes a
//!   sequence number also observes the timestamp that belongs to it.

use std::hint::spin_loop;
use std::sync::atomic::{fence, AtomicI32, AtomicI64, AtomicU32, AtomicU64, Ordering};

use crate::event::PpsEvent;
use crate::time::PpsTime;

/// Latest-value-wins container for one event kind.
#[derive(Debug, Default)]
pub struct EventMailbox {
    /// Seqlock epoch, odd while a write is in progress.
    epoch: AtomicU64,
    sec: AtomicI64,
    nsec: AtomicI32,
    sequence: AtomicU32,
}

impl EventMailbox {
    /// Create an empty mailbox (sequence 0, time zero).
    pub const fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            sec: AtomicI64::new(0),
            nsec: AtomicI32::new(0),
            sequence: AtomicU32::new(0),
        }
    }

    /// Replace the stored event and bump its sequence number.
    ///
    /// Must only be called by the mailbox's single writer. Never blocks and
    /// never allocates. Returns the new sequence number.
    pub fn publish(&self, time: PpsTime) -> u32 {
        // Odd epoch: write in progress. AcqRel keeps the payload stores below.
        self.epoch.fetch_add(1, Ordering::AcqRel);

        self.sec.store(time.sec, Ordering::Relaxed);
        self.nsec.store(time.nsec, Ordering::Relaxed);

        let sequence = self.sequence.load(Ordering::Relaxed).wrapping_add(1);
        self.sequence.store(sequence, Ordering::Release);

        // Even epoch: write complete.
        self.epoch.fetch_add(1, Ordering::Release);
        sequence
    }

    /// Read a consistent copy of the stored event.
    pub fn read(&self) -> PpsEvent {
        loop {
            let epoch_before = self.epoch.load(Ordering::Acquire);
            if epoch_before & 1 == 1 {
                spin_loop();
                continue;
            }

            let sequence = self.sequence.load(Ordering::Acquire);
            let sec = self.sec.load(Ordering::Relaxed);
            let nsec = self.nsec.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            let epoch_after = self.epoch.load(Ordering::Relaxed);

            if epoch_before == epoch_after {
                return PpsEvent {
                    time: PpsTime { sec, nsec },
                    sequence,
                };
            }
            spin_loop();
        }
    }

    /// Current sequence number without reading the payload.
    pub fn sequence(&self) -> u32 {
        self.sequence.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_empty_mailbox() {
        let mailbox = EventMailbox::new();
        assert_eq!(mailbox.read(), PpsEvent::default());
    }

    #[test]
    fn test_latest_value_wins() {
        let mailbox = EventMailbox::new();
        assert_eq!(mailbox.publish(PpsTime::new(10, 1)), 1);
        assert_eq!(mailbox.publish(PpsTime::new(11, 2)), 2);

        let event = mailbox.read();
        assert_eq!(event.sequence, 2);
        assert_eq!(event.time, PpsTime::new(11, 2));
    }

    #[test]
    fn test_sequence_wraps() {
        let mailbox = EventMailbox::new();
        mailbox.sequence.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(mailbox.publish(PpsTime::ZERO), 0);
    }

    #[test]
    fn test_concurrent_reads_never_torn() {
        // The writer encodes the sequence number into both time fields, so a
        // torn read shows up as a mismatch.
        let mailbox = Arc::new(EventMailbox::new());
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let mailbox = Arc::clone(&mailbox);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for n in 1..=50_000i64 {
                    mailbox.publish(PpsTime::new(n, n % 1_000_000_000));
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut last_sequence = 0;
        while !done.load(Ordering::Acquire) {
            let event = mailbox.read();
            assert_eq!(event.time.sec, i64::from(event.sequence));
            assert_eq!(i64::from(event.time.nsec), i64::from(event.sequence));
            assert!(event.sequence >= last_sequence);
            last_sequence = event.sequence;
        }

        writer.join().expect("writer thread panicked");
        assert_eq!(mailbox.sequence(), 50_000);
    }
}
