use crate::models::Message;

/// Bounded cursor over the response set of one turn. A freshly loaded set
/// always points at its newest entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseCarousel {
    responses: Vec<Message>,
    index: usize,
}

impl ResponseCarousel {
    pub fn new(responses: Vec<Message>) -> Self {
        let mut carousel = Self::default();
        carousel.load(responses);
        carousel
    }

    pub fn load(&mut self, responses: Vec<Message>) {
        self.index = responses.len().saturating_sub(1);
        self.responses = responses;
    }

    pub fn current(&self) -> Option<&Message> {
        self.responses.get(self.index)
    }

    /// No-op on the oldest entry.
    pub fn previous(&mut self) -> Option<&Message> {
        self.index = self.index.saturating_sub(1);
        self.current()
    }

    /// No-op on the newest entry.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&Message> {
        if self.index + 1 < self.responses.len() {
            self.index += 1;
        }
        self.current()
    }

    /// Zero-based position of the current entry.
    pub fn position(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn responses(&self) -> &[Message] {
        &self.responses
    }
}
