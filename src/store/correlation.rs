use std::fmt;
use uuid::Uuid;

/// Tags every log line of one store operation as `<op>:<8 hex digits>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId {
    op: &'static str,
    tag: String,
}

impl CorrelationId {
    pub fn new(op: &'static str) -> Self {
        let mut tag = Uuid::new_v4().simple().to_string();
        tag.truncate(8);
        Self { op, tag }
    }

    /// Store operation this id was minted for.
    pub fn op(&self) -> &'static str { self.op }

    pub fn tag(&self) -> &str { &self.tag }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}:{}", self.op, self.tag) }
}
