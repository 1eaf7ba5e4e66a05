//! Outbound flow control (spec §4.2, "Outbound backpressure").
//!
//! Every send to a socket goes through a [`BackpressureGate`] guarding a bounded FIFO queue. The gate's internal
//! mutex is the "processing" single-flight guard named in spec §4.2: it serializes the check-then-enqueue sequence
//! so concurrent senders can't both observe room under the threshold and overrun `max_queue_size`. FIFO ordering
//! itself falls out of the channel having exactly one consumer (the socket's writer task).

//local shortcuts
use crate::config::BackpressureConfig;

//third-party shortcuts
use tokio::sync::mpsc;

//standard shortcuts
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome
{
    Sent,
    Rejected,
    SlowConsumerClose,
}

//-------------------------------------------------------------------------------------------------------------------

pub struct BackpressureGate
{
    config: BackpressureConfig,
    sender: mpsc::Sender<Vec<u8>>,
    queued: AtomicUsize,
    queue_overflows: AtomicU32,
    enqueue_lock: Mutex<()>,
}

impl BackpressureGate
{
    pub fn new(config: BackpressureConfig) -> (Self, mpsc::Receiver<Vec<u8>>)
    {
        let (sender, receiver) = mpsc::channel(config.max_queue_size.max(1));
        let gate = Self{
            config,
            sender,
            queued: AtomicUsize::new(0),
            queue_overflows: AtomicU32::new(0),
            enqueue_lock: Mutex::new(()),
        };
        (gate, receiver)
    }

    /// Attempts to enqueue a frame for send. Never blocks.
    pub fn try_enqueue(&self, bytes: Vec<u8>) -> SendOutcome
    {
        let _guard = self.enqueue_lock.lock().unwrap_or_else(|e| e.into_inner());

        let queued = self.queued.load(Ordering::Acquire);
        if queued >= self.config.max_queue_size || queued >= self.config.pending_send_threshold
        {
            return self.record_overflow();
        }

        match self.sender.try_send(bytes)
        {
            Ok(()) =>
            {
                self.queued.fetch_add(1, Ordering::AcqRel);
                SendOutcome::Sent
            }
            Err(_) => self.record_overflow(),
        }
    }

    fn record_overflow(&self) -> SendOutcome
    {
        let overflows = self.queue_overflows.fetch_add(1, Ordering::AcqRel) + 1;
        if overflows >= self.config.max_queue_overflows
        {
            SendOutcome::SlowConsumerClose
        }
        else
        {
            SendOutcome::Rejected
        }
    }

    /// Called by the writer task after a queued frame has actually gone out over the wire.
    pub fn on_drained(&self)
    {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn queued_count(&self) -> usize
    {
        self.queued.load(Ordering::Acquire)
    }

    /// Models the transport's `bufferedAmount` check against a byte-size threshold (spec §4.2).
    pub fn exceeds_buffered_amount(&self, buffered_amount: usize) -> bool
    {
        buffered_amount > self.config.buffered_amount_threshold
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn overflow_past_threshold_closes_slow_consumer()
    {
        let config = BackpressureConfig{
            buffered_amount_threshold: 1_000_000,
            pending_send_threshold: 1,
            max_queue_size: 1,
            max_queue_overflows: 2,
        };
        let (gate, _rx) = BackpressureGate::new(config);

        assert_eq!(gate.try_enqueue(vec![1]), SendOutcome::Sent);
        assert_eq!(gate.try_enqueue(vec![2]), SendOutcome::Rejected);
        assert_eq!(gate.try_enqueue(vec![3]), SendOutcome::SlowConsumerClose);
    }
}

//-------------------------------------------------------------------------------------------------------------------
