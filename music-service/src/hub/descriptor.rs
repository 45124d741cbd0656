//! Resolving a (chat, message) reference into an immutable file descriptor.

use super::error::StreamError;
use super::transport::{DcId, FileLocation, HubTransport, MediaInfo, MediaKind, RawMessage};

/// Media kinds recognized by the locator, in match order. The first kind
/// present on the message wins.
const KIND_ORDER: [MediaKind; 8] = [
    MediaKind::Document,
    MediaKind::Photo,
    MediaKind::Video,
    MediaKind::Audio,
    MediaKind::Voice,
    MediaKind::VideoNote,
    MediaKind::Sticker,
    MediaKind::Animation,
];

/// Everything needed to fetch one stored file's bytes, plus denormalized
/// display attributes. Built once at resolution time and never mutated;
/// callers hold `Arc`s handed out by the worker's descriptor cache.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub kind: MediaKind,
    pub dc_id: DcId,
    pub location: FileLocation,
    /// Public handle used in HTTP routes and WebDAV file names.
    pub file_unique_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
}

impl FileDescriptor {
    fn from_media(media: &MediaInfo) -> Self {
        FileDescriptor {
            kind: media.kind,
            dc_id: media.dc_id,
            location: FileLocation {
                media_id: media.media_id,
                access_hash: media.access_hash,
                file_reference: media.file_reference.clone(),
            },
            file_unique_id: media.file_unique_id.clone(),
            file_name: media.file_name.clone().unwrap_or_default(),
            file_size: media.file_size.unwrap_or(0),
            mime_type: media.mime_type.clone().unwrap_or_default(),
        }
    }
}

/// Pick the message's streamable media, honoring [`KIND_ORDER`].
pub(crate) fn select_media(message: &RawMessage) -> Option<&MediaInfo> {
    KIND_ORDER
        .iter()
        .find_map(|kind| message.media.iter().find(|m| m.kind == *kind))
}

/// One backend lookup, no retry: a miss is a hard [`StreamError::NotFound`]
/// surfaced to the caller. Callers re-resolve only after cache eviction.
pub(crate) async fn locate(
    transport: &dyn HubTransport,
    chat_id: i64,
    message_id: i64,
) -> Result<FileDescriptor, StreamError> {
    let message = transport
        .resolve_message(chat_id, message_id)
        .await?
        .ok_or_else(|| {
            tracing::info!(chat_id, message_id, "message not found");
            StreamError::NotFound
        })?;

    let media = select_media(&message).ok_or_else(|| {
        tracing::info!(chat_id, message_id, "message carries no streamable media");
        StreamError::NotFound
    })?;

    Ok(FileDescriptor::from_media(media))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(kind: MediaKind, unique_id: &str) -> MediaInfo {
        MediaInfo {
            kind,
            dc_id: 1,
            media_id: 7,
            access_hash: 99,
            file_reference: vec![1, 2, 3],
            file_unique_id: unique_id.to_string(),
            file_name: None,
            file_size: None,
            mime_type: None,
            title: None,
            performer: None,
        }
    }

    #[test]
    fn document_wins_over_audio() {
        let message = RawMessage {
            chat_id: -100,
            message_id: 5,
            media: vec![media(MediaKind::Audio, "a"), media(MediaKind::Document, "d")],
        };
        assert_eq!(select_media(&message).unwrap().file_unique_id, "d");
    }

    #[test]
    fn no_media_is_none() {
        let message = RawMessage {
            chat_id: -100,
            message_id: 5,
            media: vec![],
        };
        assert!(select_media(&message).is_none());
    }

    #[test]
    fn missing_display_attributes_default() {
        let descriptor = FileDescriptor::from_media(&media(MediaKind::Audio, "u"));
        assert_eq!(descriptor.file_name, "");
        assert_eq!(descriptor.file_size, 0);
        assert_eq!(descriptor.mime_type, "");
    }
}
