//! Outbound byte transport
//!
//! A session only writes through a [`Transport`]. Inbound bytes are handed to
//! [`Session::feed`](crate::Session::feed) by whoever owns the read side, or
//! pumped from an async reader with [`Session::pump`](crate::Session::pump).

use parking_lot::Mutex;
use std::io::{self, Write};
use tokio::sync::mpsc;

/// Writes encoded frames to the device
pub trait Transport: Send + Sync {
    /// Send one complete frame
    fn send(&self, bytes: &[u8]) -> io::Result<()>;
}

impl<W: Write + Send> Transport for Mutex<W> {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.lock();
        writer.write_all(bytes)?;
        writer.flush()
    }
}

/// Hands each frame to a writer task
impl Transport for mpsc::UnboundedSender<Vec<u8>> {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        mpsc::UnboundedSender::send(self, bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "link closed"))
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        (**self).send(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_transport() {
        let link = Mutex::new(Vec::new());
        link.send(&[0xF0, 0x7B, 0xF7]).unwrap();
        link.send(&[0xF5, 0x0D, 0x01]).unwrap();
        assert_eq!(*link.lock(), vec![0xF0, 0x7B, 0xF7, 0xF5, 0x0D, 0x01]);
    }

    #[test]
    fn test_closed_channel_is_broken_pipe() {
        let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
        drop(rx);
        let err = Transport::send(&tx, &[0xF7]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
