//! Transmission: a named composite of one or more buffers, typically used
//! to split a single logical stream (e.g. audio and video tracks) across
//! several independently addressable buffers.

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Transmission {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub buffer_ids: Vec<Uuid>,
}

impl Transmission {
    pub fn new(
        id: Uuid,
        title: impl Into<String>,
        description: impl Into<String>,
        buffer_ids: Vec<Uuid>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            buffer_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_its_buffer_ids_in_order() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let t = Transmission::new(Uuid::new_v4(), "stream", "desc", ids.clone());
        assert_eq!(t.buffer_ids, ids);
    }
}
