//! Response transport
//!
//! The byte sink printers write into. Status and headers only take effect
//! until the first body byte is written.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

/// Destination for a printer's status, headers and body bytes
pub trait Transport: Send {
    fn set_status(&mut self, status: u16);
    fn set_header(&mut self, name: &str, value: &str);
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
}

#[derive(Debug, Default)]
struct Buffered {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    committed: bool,
}

/// In-memory transport
///
/// Clones share the same buffer, so a caller can keep a handle while the
/// printer owns another.
#[derive(Debug, Clone, Default)]
pub struct BufferedTransport {
    inner: Arc<Mutex<Buffered>>,
}

impl BufferedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<u16> {
        self.inner.lock().status
    }

    /// Last value set for `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn body(&self) -> Vec<u8> {
        self.inner.lock().body.clone()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().body).into_owned()
    }
}

impl Transport for BufferedTransport {
    fn set_status(&mut self, status: u16) {
        let mut inner = self.inner.lock();
        if !inner.committed {
            inner.status = Some(status);
        }
    }

    fn set_header(&mut self, name: &str, value: &str) {
        let mut inner = self.inner.lock();
        if !inner.committed {
            inner.headers.push((name.to_string(), value.to_string()));
        }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.committed = true;
        inner.body.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_is_frozen_after_first_write() {
        let handle = BufferedTransport::new();
        let mut transport = handle.clone();

        transport.set_status(400);
        transport.set_header("Content-Type", "application/json");
        transport.write(b"{}").unwrap();
        transport.set_status(500);
        transport.set_header("Content-Type", "text/plain");

        assert_eq!(handle.status(), Some(400));
        assert_eq!(
            handle.header("content-type").as_deref(),
            Some("application/json")
        );
        assert_eq!(handle.body_string(), "{}");
    }
}
