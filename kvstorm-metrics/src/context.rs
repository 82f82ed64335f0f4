use std::sync::Arc;
use std::time::Instant;

/// Display width of the id column in log lines.
const ID_WIDTH: usize = 15;

/// Request-scoped debug metadata carried alongside every logical operation.
///
/// A context is immutable: [`OpContext::child`] layers a new id and start
/// time on top of the receiver and returns a fresh value, never touching the
/// original. Cloning is cheap (one `Arc` bump), so contexts can travel with
/// spawned tasks and queued metric events freely.
///
/// Contexts exist purely for observability. They identify which logical
/// operation a debug line belongs to and never affect control flow.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    frame: Option<Arc<Frame>>,
}

#[derive(Debug)]
struct Frame {
    id: Arc<str>,
    started: Instant,
}

impl OpContext {
    /// The empty root context. Lookups render the sentinel values.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child context tagged with `id`, starting its clock now.
    #[must_use]
    pub fn child(&self, id: impl Into<Arc<str>>) -> Self {
        Self {
            frame: Some(Arc::new(Frame {
                id: id.into(),
                started: Instant::now(),
            })),
        }
    }

    /// Nearest enclosing operation id, left-justified to the display width,
    /// or `"Background"` if the context is empty.
    #[must_use]
    pub fn id(&self) -> String {
        let id = match &self.frame {
            Some(frame) => frame.id.as_ref(),
            None => "Background",
        };
        format!("{id:<width$}", width = ID_WIDTH)
    }

    /// Milliseconds since the nearest enclosing start time, or `"No Time"`
    /// if the context is empty.
    #[must_use]
    pub fn elapsed(&self) -> String {
        match &self.frame {
            Some(frame) => format!("{:>5}ms", frame.started.elapsed().as_millis()),
            None => "No Time".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_renders_sentinels() {
        let ctx = OpContext::background();
        assert_eq!(ctx.id(), "Background     ");
        assert_eq!(ctx.elapsed(), "No Time");
    }

    #[test]
    fn child_id_is_left_justified_to_display_width() {
        let ctx = OpContext::background().child("Get-42");
        assert_eq!(ctx.id(), "Get-42         ");
        assert_eq!(ctx.id().len(), ID_WIDTH);
    }

    #[test]
    fn long_ids_are_not_truncated() {
        let ctx = OpContext::background().child("Populate-everything");
        assert_eq!(ctx.id(), "Populate-everything");
    }

    #[test]
    fn elapsed_is_fixed_width_milliseconds() {
        let ctx = OpContext::background().child("Set-1");
        let elapsed = ctx.elapsed();
        assert!(elapsed.ends_with("ms"), "unexpected format: {elapsed}");
        assert_eq!(elapsed.len(), 7);
    }

    #[test]
    fn deriving_does_not_mutate_the_parent() {
        let parent = OpContext::background().child("1-Report");
        let _child = parent.child("Get-7");
        assert_eq!(parent.id(), "1-Report       ");
    }
}
