//! W3C Trace Context propagation for HTTP requests.
//!
//! Parses the `traceparent` header sent by upstream callers so the request
//! span can be linked to their trace.

use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};

pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Parsed `traceparent` header (`00-<trace-id>-<parent-id>-<flags>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceParent {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub trace_flags: u8,
}

impl TraceParent {
    /// Parse a version-00 `traceparent` header value.
    ///
    /// Returns `None` for unknown versions, malformed hex, or the all-zero
    /// trace/span ids the W3C spec declares invalid.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        if version != "00" || parts.next().is_some() {
            return None;
        }

        let trace_id: [u8; 16] = decode_hex(trace_id)?;
        let span_id: [u8; 8] = decode_hex(span_id)?;
        let [trace_flags] = decode_hex::<1>(flags)?;

        if trace_id == [0; 16] || span_id == [0; 8] {
            return None;
        }

        Some(Self {
            trace_id,
            span_id,
            trace_flags,
        })
    }

    /// Convert into an OpenTelemetry Context usable as a span parent.
    pub fn into_context(&self) -> opentelemetry::Context {
        let span_context = SpanContext::new(
            TraceId::from_bytes(self.trace_id),
            SpanId::from_bytes(self.span_id),
            TraceFlags::new(self.trace_flags),
            true,
            TraceState::default(),
        );

        opentelemetry::Context::new().with_remote_span_context(span_context)
    }

    pub fn is_sampled(&self) -> bool {
        self.trace_flags & 0x01 != 0
    }
}

fn decode_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    // W3C trace context only allows lowercase hex
    let lower_hex = |b: u8| b.is_ascii_digit() || (b'a'..=b'f').contains(&b);
    if s.len() != N * 2 || !s.bytes().all(lower_hex) {
        return None;
    }

    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn parse_valid_header() {
        let ctx = TraceParent::parse(VALID).unwrap();
        assert_eq!(ctx.trace_id[0], 0x4b);
        assert_eq!(ctx.trace_id[15], 0x36);
        assert_eq!(ctx.span_id[0], 0x00);
        assert_eq!(ctx.span_id[7], 0xb7);
        assert!(ctx.is_sampled());
    }

    #[test]
    fn parse_rejects_unknown_version() {
        let header = VALID.replacen("00", "ff", 1);
        assert!(TraceParent::parse(&header).is_none());
    }

    #[test]
    fn parse_rejects_bad_lengths_and_hex() {
        assert!(TraceParent::parse("00-abc-00f067aa0ba902b7-01").is_none());
        assert!(
            TraceParent::parse("00-4bf92f3577b34da6a3ce929d0e0e473z-00f067aa0ba902b7-01")
                .is_none()
        );
        assert!(TraceParent::parse("").is_none());
    }

    #[test]
    fn parse_rejects_uppercase_and_signed_hex() {
        let upper = VALID.replace("4bf92f", "4BF92F");
        assert!(TraceParent::parse(&upper).is_none());

        let signed = VALID.replace("-00f067aa0ba902b7-", "-+0f067aa0ba902b7-");
        assert!(TraceParent::parse(&signed).is_none());
    }

    #[test]
    fn parse_rejects_all_zero_ids() {
        let header = "00-00000000000000000000000000000000-00f067aa0ba902b7-01";
        assert!(TraceParent::parse(header).is_none());
    }

    #[test]
    fn into_context_creates_remote_span_context() {
        let ctx = TraceParent::parse(VALID).unwrap();
        let otel_ctx = ctx.into_context();
        let span_ref = otel_ctx.span();
        let span_ctx = span_ref.span_context();

        assert!(span_ctx.is_valid());
        assert!(span_ctx.is_remote());
        assert!(span_ctx.is_sampled());
        assert_eq!(span_ctx.trace_id().to_bytes(), ctx.trace_id);
        assert_eq!(span_ctx.span_id().to_bytes(), ctx.span_id);
    }

    #[test]
    fn unsampled_flag() {
        let header = VALID.replace("-01", "-00");
        let ctx = TraceParent::parse(&header).unwrap();
        assert!(!ctx.is_sampled());
    }
}
