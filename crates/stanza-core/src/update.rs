//! Update model and classifier.
//!
//! An [`Update`] is one event delivered by the messaging platform: a new
//! message, an edited message, a button press, an inline query, and so on.
//! The platform delivers updates as JSON objects with a numeric `update_id`
//! and at most one of the known variant fields populated.
//!
//! Stanza does not model the platform's full wire schema. An `Update` keeps
//! the raw payload and pairs it with a [`UpdateKind`] discriminant computed
//! once by [`classify`]; read-only accessors navigate the payload for the
//! handful of fields the dispatch pipeline itself needs (chat id, text,
//! callback data).
//!
//! # Classification order
//!
//! Variant fields are tested in a fixed priority order and the first present
//! field wins. The order matters: a payload must never be misclassified by
//! checking a less specific field first.

use serde_json::Value;

use crate::error::{ClassifyError, ClassifyResult};

/// The discriminant identifying which variant of an update is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// A new incoming message.
    Message,
    /// An edit to a previously sent message.
    EditedMessage,
    /// A new post in a channel.
    ChannelPost,
    /// An edit to a previously sent channel post.
    EditedChannelPost,
    /// A callback query from an inline keyboard button.
    CallbackQuery,
    /// An incoming inline query.
    InlineQuery,
    /// The result of an inline query chosen by the user.
    ChosenInlineResult,
    /// An incoming shipping query.
    ShippingQuery,
    /// An incoming pre-checkout query.
    PreCheckoutQuery,
    /// A new poll state.
    Poll,
    /// A user changed their answer in a non-anonymous poll.
    PollAnswer,
    /// None of the known variant fields were present.
    Unknown,
}

/// Variant fields in classification priority order.
///
/// The first field present in the payload determines the discriminant.
const VARIANT_FIELDS: &[(&str, UpdateKind)] = &[
    ("message", UpdateKind::Message),
    ("edited_message", UpdateKind::EditedMessage),
    ("channel_post", UpdateKind::ChannelPost),
    ("edited_channel_post", UpdateKind::EditedChannelPost),
    ("callback_query", UpdateKind::CallbackQuery),
    ("inline_query", UpdateKind::InlineQuery),
    ("chosen_inline_result", UpdateKind::ChosenInlineResult),
    ("shipping_query", UpdateKind::ShippingQuery),
    ("pre_checkout_query", UpdateKind::PreCheckoutQuery),
    ("poll", UpdateKind::Poll),
    ("poll_answer", UpdateKind::PollAnswer),
];

impl UpdateKind {
    /// Returns the payload field name carrying this variant, if any.
    pub fn field_name(&self) -> Option<&'static str> {
        VARIANT_FIELDS
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(field, _)| *field)
    }

    /// Returns a short name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::CallbackQuery => "callback_query",
            Self::InlineQuery => "inline_query",
            Self::ChosenInlineResult => "chosen_inline_result",
            Self::ShippingQuery => "shipping_query",
            Self::PreCheckoutQuery => "pre_checkout_query",
            Self::Poll => "poll",
            Self::PollAnswer => "poll_answer",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event delivered by the messaging platform.
///
/// Created once per inbound payload by [`classify`], read-only thereafter,
/// and discarded after dispatch completes. The discriminant is computed at
/// construction and never re-derived.
#[derive(Debug, Clone)]
pub struct Update {
    id: i64,
    kind: UpdateKind,
    payload: Value,
}

/// Classifies a raw payload into an [`Update`].
///
/// Tests the variant fields in the fixed priority order (message before
/// edited message before channel post before callback query, and so on) and
/// stops at the first one present. A payload with none of the known fields
/// classifies as [`UpdateKind::Unknown`] rather than erroring.
///
/// # Errors
///
/// Returns [`ClassifyError::MissingUpdateId`] if the payload has no numeric
/// `update_id`, and [`ClassifyError::NotAnObject`] if it is not an object.
pub fn classify(payload: Value) -> ClassifyResult<Update> {
    let obj = payload.as_object().ok_or(ClassifyError::NotAnObject)?;

    let id = obj
        .get("update_id")
        .and_then(Value::as_i64)
        .ok_or(ClassifyError::MissingUpdateId)?;

    let kind = VARIANT_FIELDS
        .iter()
        .find(|(field, _)| obj.contains_key(*field))
        .map(|(_, kind)| *kind)
        .unwrap_or(UpdateKind::Unknown);

    Ok(Update { id, kind, payload })
}

impl Update {
    /// The unique, monotonically increasing update identifier.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The discriminant computed at classification time.
    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    /// The raw payload as delivered by the platform.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The populated variant object, if the kind carries one.
    pub fn variant(&self) -> Option<&Value> {
        self.kind.field_name().and_then(|f| self.payload.get(f))
    }

    /// The chat this update belongs to, if it has one.
    ///
    /// For message-shaped updates this is `<variant>.chat.id`; for callback
    /// queries it is the chat of the message the keyboard was attached to.
    pub fn chat_id(&self) -> Option<i64> {
        match self.kind {
            UpdateKind::CallbackQuery => self
                .variant()
                .and_then(|v| v.pointer("/message/chat/id"))
                .and_then(Value::as_i64),
            _ => self
                .variant()
                .and_then(|v| v.pointer("/chat/id"))
                .and_then(Value::as_i64),
        }
    }

    /// The id of the user who originated this update, if present.
    pub fn from_id(&self) -> Option<i64> {
        self.variant()
            .and_then(|v| v.pointer("/from/id"))
            .and_then(Value::as_i64)
    }

    /// The text of a message-shaped update.
    pub fn text(&self) -> Option<&str> {
        self.variant()
            .and_then(|v| v.get("text"))
            .and_then(Value::as_str)
    }

    /// The leading `/command` of a message's text, with any `@botname`
    /// suffix stripped. `None` if the text does not start with a slash.
    pub fn command(&self) -> Option<&str> {
        let text = self.text()?;
        if !text.starts_with('/') {
            return None;
        }
        let first = text.split_whitespace().next()?;
        Some(first.split('@').next().unwrap_or(first))
    }

    /// The `data` payload of a callback query.
    pub fn callback_data(&self) -> Option<&str> {
        if self.kind != UpdateKind::CallbackQuery {
            return None;
        }
        self.variant()
            .and_then(|v| v.get("data"))
            .and_then(Value::as_str)
    }

    /// The text a callback query should be matched against: its `data` if
    /// present, otherwise the text of the message the button was attached to.
    pub fn callback_text(&self) -> Option<&str> {
        if self.kind != UpdateKind::CallbackQuery {
            return None;
        }
        self.callback_data().or_else(|| {
            self.variant()
                .and_then(|v| v.pointer("/message/text"))
                .and_then(Value::as_str)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_plain_message() {
        let update = classify(json!({
            "update_id": 42,
            "message": {"chat": {"id": 7}, "from": {"id": 9}, "text": "hi"}
        }))
        .unwrap();

        assert_eq!(update.id(), 42);
        assert_eq!(update.kind(), UpdateKind::Message);
        assert_eq!(update.chat_id(), Some(7));
        assert_eq!(update.from_id(), Some(9));
        assert_eq!(update.text(), Some("hi"));
    }

    #[test]
    fn classify_without_variant_fields_is_unknown() {
        let update = classify(json!({"update_id": 1})).unwrap();
        assert_eq!(update.kind(), UpdateKind::Unknown);
        assert!(update.variant().is_none());
    }

    #[test]
    fn classify_missing_update_id_is_malformed() {
        let err = classify(json!({"message": {"text": "hi"}})).unwrap_err();
        assert_eq!(err, ClassifyError::MissingUpdateId);
    }

    #[test]
    fn classify_non_object_is_malformed() {
        let err = classify(json!([1, 2, 3])).unwrap_err();
        assert_eq!(err, ClassifyError::NotAnObject);
    }

    #[test]
    fn priority_order_decides_between_pairs() {
        // For every adjacent pair of variant fields, the earlier one must
        // win when both are present.
        for window in VARIANT_FIELDS.windows(2) {
            let (earlier, expected) = window[0];
            let (later, _) = window[1];
            let update = classify(json!({
                "update_id": 1,
                earlier: {},
                later: {},
            }))
            .unwrap();
            assert_eq!(update.kind(), expected, "{earlier} should beat {later}");
        }
    }

    #[test]
    fn message_beats_poll() {
        let update = classify(json!({
            "update_id": 1,
            "poll": {"id": "p"},
            "message": {"chat": {"id": 1}, "text": "hi"},
        }))
        .unwrap();
        assert_eq!(update.kind(), UpdateKind::Message);
    }

    #[test]
    fn command_extraction_strips_bot_mention() {
        let update = classify(json!({
            "update_id": 1,
            "message": {"chat": {"id": 1}, "text": "/start@examplebot arg"}
        }))
        .unwrap();
        assert_eq!(update.command(), Some("/start"));
    }

    #[test]
    fn non_command_text_has_no_command() {
        let update = classify(json!({
            "update_id": 1,
            "message": {"chat": {"id": 1}, "text": "hello /start"}
        }))
        .unwrap();
        assert_eq!(update.command(), None);
    }

    #[test]
    fn callback_text_prefers_data_over_message_text() {
        let update = classify(json!({
            "update_id": 1,
            "callback_query": {
                "from": {"id": 3},
                "data": "confirm",
                "message": {"chat": {"id": 5}, "text": "Pick one"}
            }
        }))
        .unwrap();
        assert_eq!(update.kind(), UpdateKind::CallbackQuery);
        assert_eq!(update.callback_text(), Some("confirm"));
        assert_eq!(update.chat_id(), Some(5));
    }

    #[test]
    fn callback_text_falls_back_to_message_text() {
        let update = classify(json!({
            "update_id": 1,
            "callback_query": {
                "from": {"id": 3},
                "message": {"chat": {"id": 5}, "text": "Pick one"}
            }
        }))
        .unwrap();
        assert_eq!(update.callback_text(), Some("Pick one"));
    }
}
