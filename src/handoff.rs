// One-shot handoff between a producer render thread and a consumer.
//
// The protocol is two messages over two channels: the producer publishes a
// shared memory handle exactly once, and the consumer later asks it to stop
// exactly once. Type states enforce the "exactly once" parts; a peer that
// exits early shows up as a disconnect instead of a deadlock.

use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use crate::error::SetupError;

/// An exported OS handle to GPU memory (a POSIX file descriptor).
///
/// Ownership of the descriptor travels with the value: whoever imports it
/// into a device hands it to the driver, and nobody closes it twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedHandle(pub i32);

impl SharedHandle {
    /// Close the descriptor without importing it anywhere.
    pub fn close(self) {
        #[cfg(unix)]
        unsafe {
            use std::os::fd::{FromRawFd, OwnedFd};
            drop(OwnedFd::from_raw_fd(self.0));
        }
    }
}

struct Shutdown;

/// Create a connected producer/consumer pair.
pub fn handoff() -> (Producer, Consumer) {
    let (ready_tx, ready_rx) = sync_channel(1);
    let (stop_tx, stop_rx) = sync_channel(1);
    (
        Producer {
            ready: ready_tx,
            stop: stop_rx,
        },
        Consumer {
            ready: ready_rx,
            stop: stop_tx,
        },
    )
}

/// Producer side before the handle is published.
pub struct Producer {
    ready: SyncSender<SharedHandle>,
    stop: Receiver<Shutdown>,
}

impl Producer {
    /// Publish the shared handle. Consumes the producer so it can only
    /// happen once.
    pub fn publish(self, handle: SharedHandle) -> Result<RunningProducer, SetupError> {
        self.ready
            .send(handle)
            .map_err(|_| SetupError::Handoff("consumer hung up before the handle was published"))?;
        Ok(RunningProducer { stop: self.stop })
    }
}

/// Producer side after publishing, while the render loop runs.
pub struct RunningProducer {
    stop: Receiver<Shutdown>,
}

impl RunningProducer {
    /// Wait up to `pause` for a shutdown request. Returns true when the loop
    /// should stop, which includes the consumer having gone away.
    pub fn should_stop(&self, pause: Duration) -> bool {
        match self.stop.recv_timeout(pause) {
            Ok(Shutdown) => true,
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

/// Consumer side of the handoff.
pub struct Consumer {
    ready: Receiver<SharedHandle>,
    stop: SyncSender<Shutdown>,
}

impl Consumer {
    /// Block until the producer publishes its handle.
    pub fn wait_handle(&self) -> Result<SharedHandle, SetupError> {
        self.ready
            .recv()
            .map_err(|_| SetupError::Handoff("producer exited before publishing a handle"))
    }

    /// Ask the producer to stop. Consumes the consumer so the request can
    /// only be sent once.
    pub fn shutdown(self) {
        let _ = self.stop.send(Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handle_crosses_threads_intact() {
        let (producer, consumer) = handoff();
        let worker = thread::spawn(move || {
            let running = producer.publish(SharedHandle(42)).unwrap();
            while !running.should_stop(Duration::from_millis(10)) {}
        });

        assert_eq!(consumer.wait_handle().unwrap(), SharedHandle(42));
        consumer.shutdown();
        worker.join().unwrap();
    }

    #[test]
    fn producer_death_unblocks_consumer() {
        let (producer, consumer) = handoff();
        drop(producer);
        let err = consumer.wait_handle().unwrap_err();
        assert_eq!(err.stage(), crate::SetupStage::Handoff);
    }

    #[test]
    fn consumer_death_stops_producer_loop() {
        let (producer, consumer) = handoff();
        let running = producer.publish(SharedHandle(3)).unwrap();
        assert_eq!(consumer.wait_handle().unwrap(), SharedHandle(3));
        drop(consumer);
        assert!(running.should_stop(Duration::from_millis(1)));
    }

    #[test]
    fn loop_keeps_going_until_shutdown() {
        let (producer, consumer) = handoff();
        let running = producer.publish(SharedHandle(7)).unwrap();
        let _ = consumer.wait_handle().unwrap();

        assert!(!running.should_stop(Duration::from_millis(1)));
        consumer.shutdown();
        assert!(running.should_stop(Duration::from_millis(100)));
    }

    #[cfg(unix)]
    #[test]
    fn close_releases_the_descriptor() {
        use std::os::fd::IntoRawFd;

        let fd = std::fs::File::open("/dev/null").unwrap().into_raw_fd();
        SharedHandle(fd).close();

        // POSIX hands out the lowest free descriptor, so a fresh open
        // only reuses the number if the close went through.
        let reopened = std::fs::File::open("/dev/null").unwrap().into_raw_fd();
        assert_eq!(reopened, fd);
        SharedHandle(reopened).close();
    }
}
