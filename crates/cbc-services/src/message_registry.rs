use cbc_core::CbcMessage;

/// What an upsert did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    /// An entry with the same message id existed; it was overwritten in
    /// place and is returned here.
    Replaced(Box<CbcMessage>),
}

/// Active broadcast messages keyed by message id, in insertion order.
#[derive(Debug, Default)]
pub struct MessageRegistry {
    messages: Vec<CbcMessage>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, or replace the entry with the same id keeping its position.
    pub fn upsert(&mut self, message: CbcMessage) -> Upsert {
        match self
            .messages
            .iter_mut()
            .find(|m| m.message_id() == message.message_id())
        {
            Some(slot) => Upsert::Replaced(Box::new(std::mem::replace(slot, message))),
            None => {
                self.messages.push(message);
                Upsert::Inserted
            }
        }
    }

    pub fn remove(&mut self, message_id: u16) -> Option<CbcMessage> {
        let idx = self
            .messages
            .iter()
            .position(|m| m.message_id() == message_id)?;
        Some(self.messages.remove(idx))
    }

    pub fn by_id(&self, message_id: u16) -> Option<&CbcMessage> {
        self.messages.iter().find(|m| m.message_id() == message_id)
    }

    pub fn contains(&self, message_id: u16) -> bool {
        self.by_id(message_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CbcMessage> {
        self.messages.iter()
    }

    pub fn cbs(&self) -> impl Iterator<Item = &CbcMessage> {
        self.messages.iter().filter(|m| !m.is_etws())
    }

    pub fn etws(&self) -> impl Iterator<Item = &CbcMessage> {
        self.messages.iter().filter(|m| m.is_etws())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
