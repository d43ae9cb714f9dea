//! Virtual-list-view and server-side sort controls
//!
//! `ldap3` ships paged-results but not these two, so they are BER-encoded
//! here with `lber`, the same way `ldap3` builds its own controls.

use bytes::BytesMut;
use lber::common::TagClass;
use lber::parse::{parse_tag, parse_uint};
use lber::structure::StructureTag;
use lber::structures::{ASNTag, Boolean, Integer, OctetString, Sequence, Tag};
use lber::universal::Types;
use lber::write;
use ldap3::controls::{Control, RawControl};
use tracing::warn;

use dirsvc::error::{DirectoryError, DirectoryResult};
use dirsvc::paging::{PageWindow, SortKey};

/// Virtual List View request (draft-ietf-ldapext-ldapv3-vlv).
pub const VLV_REQUEST_OID: &str = "2.16.840.1.113730.3.4.9";

/// Virtual List View response.
pub const VLV_RESPONSE_OID: &str = "2.16.840.1.113730.3.4.10";

/// Server-side sort request (RFC 2891).
pub const SORT_REQUEST_OID: &str = "1.2.840.113556.1.4.473";

/// Decoded Virtual List View response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlvResponse {
    /// Server's position of the target entry.
    pub target_position: u64,
    /// Server's estimate of the full list size.
    pub content_count: u64,
    /// `virtualListViewResult` code; 0 is success.
    pub result: u64,
}

fn integer(value: u32) -> Tag {
    Tag::Integer(Integer {
        inner: i64::from(value),
        ..Default::default()
    })
}

fn encode(tag: Tag) -> DirectoryResult<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(32);
    write::encode_into(&mut buf, tag.into_structure())
        .map_err(|e| DirectoryError::internal_with_source("failed to encode LDAP control", e))?;
    Ok(buf.to_vec())
}

/// VLV request control for `window`, targeting by offset.
///
/// ```text
/// SEQUENCE {
///     beforeCount   INTEGER,
///     afterCount    INTEGER,
///     byOffset [0]  SEQUENCE { offset INTEGER, contentCount INTEGER } }
/// ```
pub fn vlv_request(window: &PageWindow) -> DirectoryResult<RawControl> {
    let by_offset = Tag::Sequence(Sequence {
        class: TagClass::Context,
        id: 0,
        inner: vec![integer(window.offset), integer(window.content_count)],
    });

    let value = Tag::Sequence(Sequence {
        inner: vec![integer(window.before), integer(window.after), by_offset],
        ..Default::default()
    });

    Ok(RawControl {
        ctype: VLV_REQUEST_OID.to_owned(),
        crit: true,
        val: Some(encode(value)?),
    })
}

/// Sort request control with a single key.
///
/// ```text
/// SEQUENCE OF SEQUENCE {
///     attributeType      OCTET STRING,
///     reverseOrder  [1]  BOOLEAN DEFAULT FALSE }
/// ```
pub fn sort_request(key: &SortKey) -> DirectoryResult<RawControl> {
    let mut inner = vec![Tag::OctetString(OctetString {
        inner: key.attribute.as_bytes().to_vec(),
        ..Default::default()
    })];
    if key.reverse {
        inner.push(Tag::Boolean(Boolean {
            class: TagClass::Context,
            id: 1,
            inner: true,
        }));
    }

    let value = Tag::Sequence(Sequence {
        inner: vec![Tag::Sequence(Sequence {
            inner,
            ..Default::default()
        })],
        ..Default::default()
    });

    Ok(RawControl {
        ctype: SORT_REQUEST_OID.to_owned(),
        crit: true,
        val: Some(encode(value)?),
    })
}

fn expect_uint(tag: StructureTag, id: Types) -> Option<u64> {
    let payload = tag
        .match_class(TagClass::Universal)
        .and_then(|t| t.match_id(id as u64))
        .and_then(|t| t.expect_primitive())?;
    parse_uint(payload.as_slice()).ok().map(|(_, value)| value)
}

/// Decode a VLV response control value.
pub fn parse_vlv_response(value: &[u8]) -> Option<VlvResponse> {
    let (_, tag) = parse_tag(value).ok()?;
    let mut components = tag.expect_constructed()?.into_iter();

    let target_position = expect_uint(components.next()?, Types::Integer)?;
    let content_count = expect_uint(components.next()?, Types::Integer)?;
    let result = expect_uint(components.next()?, Types::Enumerated)?;

    Some(VlvResponse {
        target_position,
        content_count,
        result,
    })
}

/// Total-count hint from a search's response controls.
pub fn total_count(ctrls: &[Control]) -> Option<u64> {
    let raw = ctrls
        .iter()
        .map(|Control(_, raw)| raw)
        .find(|raw| raw.ctype == VLV_RESPONSE_OID)?;

    let Some(value) = raw.val.as_deref() else {
        warn!("VLV response control has no value");
        return None;
    };

    match parse_vlv_response(value) {
        Some(response) if response.result == 0 => Some(response.content_count),
        Some(response) => {
            warn!(result = response.result, "Server rejected the virtual list view");
            None
        }
        None => {
            warn!("Malformed VLV response control");
            None
        }
    }
}
