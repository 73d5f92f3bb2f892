use crate::error::DispatchError;
use crate::registry::HeaderVec;
use dashmap::DashMap;
use http::StatusCode;
use may_minihttp::Response;
use tracing::debug;

/// Distinct header blocks one dispatcher keeps alive.
pub const MAX_HEADER_BLOCKS: usize = 4096;

/// Framing headers may_minihttp writes itself.
const FRAMING_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

fn status_reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("OK")
}

fn is_framing(name: &str) -> bool {
    FRAMING_HEADERS.iter().any(|f| name.eq_ignore_ascii_case(f))
}

fn is_writable(name: &str, value: &str) -> bool {
    let injects = |s: &str| s.contains('\r') || s.contains('\n');
    !name.is_empty() && !name.contains(':') && !injects(name) && !injects(value)
}

/// Interned response header blocks, shared by every connection of one dispatcher.
///
/// may_minihttp only takes `&'static str` header lines and separates them with CRLF, so
/// all headers of a response go out as a single multi-line block. That keeps a response
/// at one header slot no matter how many headers the session sets. Each distinct block
/// is leaked once and reused.
#[derive(Debug)]
pub struct HeaderBlocks {
    blocks: DashMap<String, &'static str>,
    capacity: usize,
}

impl Default for HeaderBlocks {
    fn default() -> Self {
        Self::with_capacity(MAX_HEADER_BLOCKS)
    }
}

impl HeaderBlocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            blocks: DashMap::new(),
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Render `headers` as one wire block. `Ok(None)` when nothing is left to write.
    ///
    /// # Errors
    ///
    /// `ResponseHeader` when a header cannot be written verbatim (CR/LF in it, empty or
    /// malformed name) or when the table is full and the block is new.
    pub fn block(&self, headers: &HeaderVec) -> Result<Option<&'static str>, DispatchError> {
        let mut block = String::new();
        for (name, value) in headers {
            if is_framing(name) {
                debug!(header = %name, "Framing header left to the server");
                continue;
            }
            if !is_writable(name, value) {
                return Err(DispatchError::ResponseHeader(format!(
                    "{name:?} cannot be written to the wire"
                )));
            }
            if !block.is_empty() {
                block.push_str("\r\n");
            }
            block.push_str(name);
            block.push_str(": ");
            block.push_str(value);
        }
        if block.is_empty() {
            return Ok(None);
        }

        if let Some(existing) = self.blocks.get(&block) {
            return Ok(Some(*existing.value()));
        }
        if self.blocks.len() >= self.capacity {
            return Err(DispatchError::ResponseHeader(format!(
                "header block table full ({} entries)",
                self.capacity
            )));
        }
        Ok(Some(
            *self
                .blocks
                .entry(block.clone())
                .or_insert_with(|| Box::leak(block.into_boxed_str()))
                .value(),
        ))
    }
}

/// A response ready for the wire.
#[derive(Debug)]
pub struct WireResponse {
    pub status: u16,
    pub header_block: Option<&'static str>,
    pub body: Vec<u8>,
}

/// Write a response to the wire: status, headers, body.
pub fn write_response(res: &mut Response, response: WireResponse) {
    res.status_code(usize::from(response.status), status_reason(response.status));
    if let Some(block) = response.header_block {
        res.header(block);
    }
    res.body_vec(response.body);
}
