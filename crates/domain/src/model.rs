use crate::error::CoreError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Opaque account identifier. A transparent newtype over the stored `bigint`
/// primary key, so `get_post(id)` can't accidentally be handed an
/// `AccountId` and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct AccountId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct PostId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct MediaAssetId(pub i64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for MediaAssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub platform_user_id: String,
    pub handle: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub timezone: Tz,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaAsset {
    pub id: MediaAssetId,
    pub account_id: AccountId,
    pub stored_path: String,
    pub media_url: String,
    pub bytes: i64,
    pub sha256: String,
    pub short_hash: String,
}

/// Canonical post types. Spec §9 pins this set and rejects other spellings
/// (including a bare UI-level `media_type`) at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    Photo,
    ReelFeed,
    ReelOnly,
    Carousel,
}

impl PostType {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::ReelFeed => "reel_feed",
            Self::ReelOnly => "reel_only",
            Self::Carousel => "carousel",
        }
    }

    pub fn parse(v: &str) -> Result<Self, CoreError> {
        match v {
            "photo" => Ok(Self::Photo),
            "reel_feed" => Ok(Self::ReelFeed),
            "reel_only" => Ok(Self::ReelOnly),
            "carousel" => Ok(Self::Carousel),
            other => Err(CoreError::Validation(format!(
                "unsupported post_type: {other} (expected photo|reel_feed|reel_only|carousel)"
            ))),
        }
    }
}

/// Typed carousel/single-media envelope. Validated on read: a `Carousel`
/// must carry 2-10 urls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaRef {
    Single { url: String },
    Carousel { urls: Vec<String> },
}

impl MediaRef {
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            MediaRef::Single { url } => {
                if url.trim().is_empty() {
                    return Err(CoreError::Validation("media_url must not be empty".into()));
                }
                Ok(())
            }
            MediaRef::Carousel { urls } => {
                if !(2..=10).contains(&urls.len()) {
                    return Err(CoreError::Validation(format!(
                        "carousel must have 2-10 urls, got {}",
                        urls.len()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Parse the wire form: either a bare URL string or, for carousels, a
    /// JSON envelope `{"type":"carousel","urls":[...]}`.
    pub fn from_wire(post_type: PostType, media_url: &str) -> Result<Self, CoreError> {
        if post_type == PostType::Carousel {
            let v: serde_json::Value = serde_json::from_str(media_url)
                .map_err(|e| CoreError::Validation(format!("invalid carousel envelope: {e}")))?;
            let urls = v
                .get("urls")
                .and_then(|u| u.as_array())
                .ok_or_else(|| CoreError::Validation("carousel envelope missing urls".into()))?
                .iter()
                .map(|u| {
                    u.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| CoreError::Validation("carousel url must be a string".into()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let media = MediaRef::Carousel { urls };
            media.validate()?;
            Ok(media)
        } else {
            let media = MediaRef::Single {
                url: media_url.to_string(),
            };
            media.validate()?;
            Ok(media)
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            MediaRef::Single { url } => url.clone(),
            MediaRef::Carousel { .. } => {
                serde_json::to_string(self).expect("MediaRef serializes")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Scheduled,
    Leased,
    Publishing,
    Posted,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Leased => "leased",
            Self::Publishing => "publishing",
            Self::Posted => "posted",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(v: &str) -> Result<Self, CoreError> {
        match v {
            "scheduled" => Ok(Self::Scheduled),
            "leased" => Ok(Self::Leased),
            "publishing" => Ok(Self::Publishing),
            "posted" => Ok(Self::Posted),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::Validation(format!("unknown post status: {other}"))),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Posted | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: PostId,
    pub account_id: AccountId,
    pub platform: String,
    pub post_type: PostType,
    pub media: MediaRef,
    pub caption: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub status: PostStatus,
    pub retry_count: i32,
    pub error_code: Option<String>,
    pub publish_result: serde_json::Value,
    pub locked_at: Option<DateTime<Utc>>,
    pub client_request_id: Option<String>,
}

/// Extracts `TEXT` from a url path containing `*****TEXT*****`, bounded to
/// 200 chars. Used by the planner and by `replace` when the caller does not
/// supply a caption.
pub fn extract_caption_from_filename(path: &str) -> Option<String> {
    const MARK: &str = "*****";
    let start = path.find(MARK)? + MARK.len();
    let rest = &path[start..];
    let end = rest.find(MARK)?;
    let text = &rest[..end];
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_extraction_pulls_bracketed_text() {
        let path = "https://cdn.example.com/media/*****Hello world*****.jpg";
        assert_eq!(
            extract_caption_from_filename(path).as_deref(),
            Some("Hello world")
        );
    }

    #[test]
    fn caption_extraction_is_none_without_markers() {
        assert!(extract_caption_from_filename("https://cdn.example.com/a.jpg").is_none());
    }

    #[test]
    fn caption_extraction_truncates_to_200_chars() {
        let long = "x".repeat(300);
        let path = format!("https://cdn.example.com/*****{long}*****.jpg");
        let caption = extract_caption_from_filename(&path).unwrap();
        assert_eq!(caption.len(), 200);
    }

    #[test]
    fn post_type_round_trips_through_db_str() {
        for pt in [
            PostType::Photo,
            PostType::ReelFeed,
            PostType::ReelOnly,
            PostType::Carousel,
        ] {
            assert_eq!(PostType::parse(pt.as_db_str()).unwrap(), pt);
        }
        assert!(PostType::parse("media_type_video").is_err());
    }

    #[test]
    fn carousel_envelope_rejects_out_of_range_counts() {
        let one = MediaRef::Carousel {
            urls: vec!["a".into()],
        };
        assert!(one.validate().is_err());
        let eleven = MediaRef::Carousel {
            urls: (0..11).map(|i| i.to_string()).collect(),
        };
        assert!(eleven.validate().is_err());
        let ok = MediaRef::Carousel {
            urls: vec!["a".into(), "b".into()],
        };
        assert!(ok.validate().is_ok());
    }
}
