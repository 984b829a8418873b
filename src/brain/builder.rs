// RequestBuilder - chainable builder for MessageRequest

use super::{Message, MessageRequest, Role};

pub struct RequestBuilder {
    model: String,
    system: Option<String>,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: Option<f32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    stop_sequences: Option<Vec<String>>,
}

impl RequestBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages: Vec::new(),
            max_tokens: 4096,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        self.system = (!system.is_empty()).then_some(system);
        self
    }

    pub fn user_text(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user_text(content));
        self
    }

    pub fn assistant_text(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::assistant_text(content));
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn top_p(mut self, top_p: Option<f32>) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn top_k(mut self, top_k: Option<u32>) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.stop_sequences = Some(sequences);
        self
    }

    pub fn build(self) -> Result<MessageRequest, &'static str> {
        if self.messages.is_empty() {
            return Err("messages cannot be empty");
        }

        if self.messages.first().map(|m| &m.role) != Some(&Role::User) {
            return Err("first message must have user role");
        }

        Ok(MessageRequest {
            model: self.model,
            system: self.system,
            messages: self.messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            stop_sequences: self.stop_sequences,
        })
    }
}
