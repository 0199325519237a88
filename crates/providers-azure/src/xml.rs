//! Decoders for the Atom feeds of the Event Hubs management API and the
//! enumeration results of the Blob service.

use std::collections::HashMap;

use ehm_providers::{Error, Result, SequenceBounds};
use quick_xml::Reader;
use quick_xml::events::Event;

enum Node<'p> {
    Text(&'p [String], String),
    End(&'p [String]),
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

fn decode_error(e: impl std::fmt::Display) -> Error {
    Error::Decode(format!("invalid xml: {e}"))
}

/// Streams the document, tracking the local names of open elements.
fn walk(xml: &str, mut visit: impl FnMut(Node<'_>) -> Result<()>) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event().map_err(decode_error)? {
            Event::Start(e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Event::Empty(e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                visit(Node::End(&path))?;
                path.pop();
            }
            Event::End(_) => {
                visit(Node::End(&path))?;
                path.pop();
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(decode_error)?.into_owned();
                visit(Node::Text(&path, text))?;
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                visit(Node::Text(&path, text))?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(())
}

fn number<T: std::str::FromStr>(field: &str, text: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse()
        .map_err(|e| Error::Decode(format!("invalid {field} {text:?}: {e}")))
}

/// `EventHubDescription` content of a feed entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventHubDescription {
    pub message_retention_in_days: u32,
    pub partition_count: usize,
    pub partition_ids: Vec<String>,
}

/// One Atom feed entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub description: Option<EventHubDescription>,
}

pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let mut entries = Vec::new();
    let mut current = FeedEntry::default();

    walk(xml, |node| {
        match node {
            Node::Text(path, text) => {
                if ends_with(path, &["entry", "title"]) {
                    current.title = text;
                } else if ends_with(path, &["EventHubDescription", "MessageRetentionInDays"]) {
                    current
                        .description
                        .get_or_insert_with(Default::default)
                        .message_retention_in_days = number("MessageRetentionInDays", &text)?;
                } else if ends_with(path, &["EventHubDescription", "PartitionCount"]) {
                    current
                        .description
                        .get_or_insert_with(Default::default)
                        .partition_count = number("PartitionCount", &text)?;
                } else if ends_with(path, &["EventHubDescription", "PartitionIds", "string"]) {
                    current
                        .description
                        .get_or_insert_with(Default::default)
                        .partition_ids
                        .push(text);
                }
            }
            Node::End(path) => {
                if ends_with(path, &["feed", "entry"]) {
                    entries.push(std::mem::take(&mut current));
                }
            }
        }
        Ok(())
    })?;

    Ok(entries)
}

pub fn parse_partition_description(xml: &str) -> Result<SequenceBounds> {
    let mut begin = None;
    let mut end = None;

    walk(xml, |node| {
        if let Node::Text(path, text) = node {
            if ends_with(path, &["PartitionDescription", "BeginSequenceNumber"]) {
                begin = Some(number("BeginSequenceNumber", &text)?);
            } else if ends_with(path, &["PartitionDescription", "EndSequenceNumber"]) {
                end = Some(number("EndSequenceNumber", &text)?);
            }
        }
        Ok(())
    })?;

    match (begin, end) {
        (Some(min), Some(max)) => Ok(SequenceBounds::new(min, max)),
        _ => Err(Error::Decode(
            "partition description without sequence numbers".to_string(),
        )),
    }
}

/// One page of a container enumeration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerPage {
    pub names: Vec<String>,
    pub next_marker: Option<String>,
}

pub fn parse_container_list(xml: &str) -> Result<ContainerPage> {
    let mut page = ContainerPage::default();

    walk(xml, |node| {
        if let Node::Text(path, text) = node {
            if ends_with(path, &["Containers", "Container", "Name"]) {
                page.names.push(text);
            } else if ends_with(path, &["EnumerationResults", "NextMarker"]) {
                page.next_marker = Some(text);
            }
        }
        Ok(())
    })?;

    Ok(page)
}

/// A blob of a listing with its properties of interest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlobItem {
    pub name: String,
    pub last_modified: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// One page of a blob enumeration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlobPage {
    pub prefixes: Vec<String>,
    pub blobs: Vec<BlobItem>,
    pub next_marker: Option<String>,
}

pub fn parse_blob_list(xml: &str) -> Result<BlobPage> {
    let mut page = BlobPage::default();
    let mut current = BlobItem::default();

    walk(xml, |node| {
        match node {
            Node::Text(path, text) => {
                if ends_with(path, &["Blobs", "BlobPrefix", "Name"]) {
                    page.prefixes.push(text);
                } else if ends_with(path, &["Blobs", "Blob", "Name"]) {
                    current.name = text;
                } else if ends_with(path, &["Blob", "Properties", "Last-Modified"]) {
                    current.last_modified = Some(text);
                } else if path.len() >= 2 && ends_with(&path[..path.len() - 1], &["Blob", "Metadata"])
                {
                    if let Some(key) = path.last() {
                        current.metadata.insert(key.to_lowercase(), text);
                    }
                } else if ends_with(path, &["EnumerationResults", "NextMarker"]) {
                    page.next_marker = Some(text);
                }
            }
            Node::End(path) => {
                if ends_with(path, &["Blobs", "Blob"]) {
                    page.blobs.push(std::mem::take(&mut current));
                }
            }
        }
        Ok(())
    })?;

    Ok(page)
}
