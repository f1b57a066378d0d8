//! Attachment discovery inside nested multipart bodies.
//!
//! A parsed message is first reduced to a [`BodyPart`] tree, then walked
//! depth-first in part order. The first leaf declared as
//! `application/octet-stream` is the attachment.

use mail_parser::{Message, MessagePart, MimeHeaders, PartType};

use crate::error::MimeError;

/// Content type that marks a part as the payload.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A message body: either a single part or an ordered list of children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPart<'a> {
    Leaf(Leaf<'a>),
    Container(Vec<BodyPart<'a>>),
}

/// A non-multipart body part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf<'a> {
    /// Lowercased `type/subtype`, parameters dropped.
    pub content_type: String,
    pub filename: Option<&'a str>,
    pub body: LeafBody<'a>,
}

/// Transfer-decoded content of a leaf, or why it could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafBody<'a> {
    Decoded(&'a [u8]),
    Malformed(String),
}

/// An attachment lifted out of its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub content: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: String,
}

impl Leaf<'_> {
    pub fn is_octet_stream(&self) -> bool {
        self.content_type == OCTET_STREAM
    }
}

impl<'a> BodyPart<'a> {
    /// Build the body tree of a parsed message.
    pub fn from_message(message: &'a Message<'a>) -> Self {
        match message.parts.first() {
            Some(root) => convert(message, root),
            None => BodyPart::Container(Vec::new()),
        }
    }
}

fn convert<'a>(message: &'a Message<'a>, part: &'a MessagePart<'a>) -> BodyPart<'a> {
    if let PartType::Multipart(ids) = &part.body {
        let children = ids
            .iter()
            .map(|id| match message.parts.get(*id as usize) {
                Some(child) => convert(message, child),
                None => BodyPart::Leaf(Leaf {
                    content_type: String::new(),
                    filename: None,
                    body: LeafBody::Malformed(format!("missing body part #{id}")),
                }),
            })
            .collect();
        return BodyPart::Container(children);
    }

    let content_type = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| "text/plain".to_string())
        .to_ascii_lowercase();

    let body = if part.is_encoding_problem {
        LeafBody::Malformed(format!("invalid {content_type} transfer encoding"))
    } else {
        LeafBody::Decoded(part.contents())
    };

    BodyPart::Leaf(Leaf {
        content_type,
        filename: part.attachment_name(),
        body,
    })
}

/// Find the first octet-stream leaf, depth-first in part order.
///
/// Only multipart bodies are searched; a single-part message never carries an
/// attachment. Reaching a malformed part is an error rather than a miss.
pub fn find_attachment<'p, 'a>(body: &'p BodyPart<'a>) -> Result<Option<&'p Leaf<'a>>, MimeError> {
    match body {
        BodyPart::Container(children) => search(children, ""),
        BodyPart::Leaf(_) => Ok(None),
    }
}

fn search<'p, 'a>(children: &'p [BodyPart<'a>], prefix: &str) -> Result<Option<&'p Leaf<'a>>, MimeError> {
    for (index, child) in children.iter().enumerate() {
        let path = format!("{prefix}{}", index + 1);
        match child {
            BodyPart::Container(nested) => {
                if let Some(found) = search(nested, &format!("{path}."))? {
                    return Ok(Some(found));
                }
            }
            BodyPart::Leaf(leaf) => {
                if let LeafBody::Malformed(reason) = &leaf.body {
                    return Err(MimeError::MalformedPart {
                        path,
                        reason: reason.clone(),
                    });
                }
                if leaf.is_octet_stream() {
                    return Ok(Some(leaf));
                }
            }
        }
    }
    Ok(None)
}

/// Copy a located leaf into an owned [`Attachment`].
pub fn extract(leaf: &Leaf<'_>) -> Result<Attachment, MimeError> {
    match &leaf.body {
        LeafBody::Decoded(bytes) => Ok(Attachment {
            content: bytes.to_vec(),
            filename: leaf.filename.map(str::to_string),
            content_type: leaf.content_type.clone(),
        }),
        LeafBody::Malformed(reason) => Err(MimeError::MalformedPart {
            path: "attachment".into(),
            reason: reason.clone(),
        }),
    }
}
