use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::decoder::{Channel, RawItem};
use crate::storage::{Feed, Item, ValidationError};

/// Why an item was left out of a normalized feed.
#[derive(Debug, Clone, Error)]
pub enum SkipReason {
    /// `<pubDate>` was present but not an RFC 2822 date.
    #[error("invalid publication date {value:?}: {source}")]
    InvalidDate {
        value: String,
        source: chrono::ParseError,
    },

    /// A required item field was empty.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// An item that did not survive normalization, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedItem {
    pub item: RawItem,
    pub reason: SkipReason,
}

impl Serialize for SkippedItem {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("SkippedItem", 2)?;
        state.serialize_field("item", &self.item)?;
        state.serialize_field("reason", &self.reason.to_string())?;
        state.end()
    }
}

/// A validated feed plus every item that had to be dropped.
#[derive(Debug, Clone, Serialize)]
pub struct Normalized {
    pub feed: Feed,
    pub skipped: Vec<SkippedItem>,
}

/// Convert a decoded channel into a validated [`Feed`].
///
/// Channel-level problems are fatal. Item-level problems never are: the item
/// is recorded in [`Normalized::skipped`], logged, and the rest carry on in
/// document order. Items come back with an unassigned feed id.
pub fn normalize(channel: &Channel) -> Result<Normalized, ValidationError> {
    let mut feed = Feed::new(
        &channel.title,
        &channel.description,
        &channel.link,
        Some(channel.image.as_str()),
    )?;

    let mut skipped = Vec::new();
    for raw in &channel.items {
        match normalize_item(raw) {
            Ok(item) => feed.items.push(item),
            Err(reason) => {
                tracing::warn!(
                    feed = %feed.link,
                    item = %raw.link,
                    reason = %reason,
                    "Skipping feed item"
                );
                skipped.push(SkippedItem {
                    item: raw.clone(),
                    reason,
                });
            }
        }
    }

    Ok(Normalized { feed, skipped })
}

fn normalize_item(raw: &RawItem) -> Result<Item, SkipReason> {
    let date = parse_pub_date(&raw.pub_date)?;
    Ok(Item::draft(&raw.title, &raw.link, date)?)
}

/// Parse an RSS `pubDate`. Blank means "unknown" and yields `None`.
fn parse_pub_date(value: &str) -> Result<Option<DateTime<Utc>>, SkipReason> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc2822(value)
        .map(|date| Some(date.with_timezone(&Utc)))
        .map_err(|source| SkipReason::InvalidDate {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Field, UNASSIGNED_FEED};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn raw(title: &str, link: &str, pub_date: &str) -> RawItem {
        RawItem {
            title: title.into(),
            link: link.into(),
            pub_date: pub_date.into(),
        }
    }

    fn channel(items: Vec<RawItem>) -> Channel {
        Channel {
            title: " Example ".into(),
            description: "Things".into(),
            link: "https://example.com/".into(),
            image: String::new(),
            items,
        }
    }

    #[test]
    fn test_one_bad_date_out_of_three() {
        let normalized = normalize(&channel(vec![
            raw("A", "https://example.com/a", "Mon, 02 Jan 2006 15:04:05 -0700"),
            raw("B", "https://example.com/b", "yesterday-ish"),
            raw("C", "https://example.com/c", "Tue, 10 Jun 2003 04:00:00 GMT"),
        ]))
        .unwrap();

        let titles: Vec<&str> = normalized.feed.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
        assert_eq!(normalized.skipped.len(), 1);
        assert_eq!(normalized.skipped[0].item.title, "B");
        assert!(matches!(
            normalized.skipped[0].reason,
            SkipReason::InvalidDate { ref value, .. } if value == "yesterday-ish"
        ));
    }

    #[test]
    fn test_dates_are_converted_to_utc() {
        let normalized = normalize(&channel(vec![raw(
            "A",
            "https://example.com/a",
            "Mon, 02 Jan 2006 15:04:05 -0700",
        )]))
        .unwrap();

        let want = Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap();
        assert_eq!(normalized.feed.items[0].publication_date, want);
        assert_eq!(normalized.feed.items[0].feed_id, UNASSIGNED_FEED);
    }

    #[test]
    fn test_blank_date_defaults_to_now() {
        let normalized =
            normalize(&channel(vec![raw("A", "https://example.com/a", "  ")])).unwrap();
        let age = Utc::now() - normalized.feed.items[0].publication_date;
        assert!(age < Duration::seconds(5));
    }

    #[test]
    fn test_item_missing_link_is_skipped() {
        let normalized = normalize(&channel(vec![
            raw("A", " ", ""),
            raw("B", "https://example.com/b", ""),
        ]))
        .unwrap();

        assert_eq!(normalized.feed.items.len(), 1);
        assert!(matches!(
            normalized.skipped[0].reason,
            SkipReason::Invalid(ValidationError { field: Field::Link })
        ));
    }

    #[test]
    fn test_date_is_checked_before_fields() {
        let normalized = normalize(&channel(vec![raw("", "", "garbage")])).unwrap();
        assert!(matches!(
            normalized.skipped[0].reason,
            SkipReason::InvalidDate { .. }
        ));
    }

    #[test]
    fn test_channel_fields_are_trimmed() {
        let mut ch = channel(Vec::new());
        ch.image = " https://example.com/logo.png ".into();
        let normalized = normalize(&ch).unwrap();

        assert_eq!(normalized.feed.title, "Example");
        assert_eq!(
            normalized.feed.image.as_deref(),
            Some("https://example.com/logo.png")
        );
    }

    #[test]
    fn test_missing_channel_field_is_fatal() {
        let mut ch = channel(vec![raw("A", "https://example.com/a", "")]);
        ch.description = "\n".into();
        let err = normalize(&ch).unwrap_err();
        assert_eq!(err.field, Field::Description);
    }

    #[test]
    fn test_empty_channel_is_fatal() {
        let err = normalize(&Channel::default()).unwrap_err();
        assert_eq!(err.field, Field::Title);
    }

    #[test]
    fn test_skipped_item_serializes_reason_as_text() {
        let skipped = SkippedItem {
            item: raw("A", "", ""),
            reason: SkipReason::Invalid(ValidationError::required(Field::Link)),
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["reason"], "link is required");
        assert_eq!(json["item"]["title"], "A");
    }
}
