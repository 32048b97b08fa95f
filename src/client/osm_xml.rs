//! Request bodies for OSM API writes
//!
//! The API accepts element and changeset payloads as XML only. Bodies are
//! small and flat, so they are written directly.

use crate::geo::{ElementBody, ElementDraft};
use std::collections::BTreeMap;
use std::fmt::Write;

const GENERATOR: &str = concat!("osmate ", env!("CARGO_PKG_VERSION"));

/// Escape text for use inside a double-quoted attribute
pub(super) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            c => out.push(c),
        }
    }
    out
}

fn write_tags(out: &mut String, tags: &BTreeMap<String, String>) {
    for (k, v) in tags {
        let _ = write!(out, "<tag k=\"{}\" v=\"{}\"/>", escape(k), escape(v));
    }
}

/// `<osm><changeset>…</changeset></osm>` for changeset creation
pub(super) fn changeset(tags: &BTreeMap<String, String>) -> String {
    let mut out = format!("<osm version=\"0.6\" generator=\"{GENERATOR}\"><changeset>");
    write_tags(&mut out, tags);
    out.push_str("</changeset></osm>");
    out
}

/// Full element document for create/edit/delete.
///
/// `id` and `version` are omitted for new elements.
pub(super) fn element(draft: &ElementDraft, changeset_id: u64) -> String {
    let kind = draft.kind().as_str();
    let mut out = format!("<osm version=\"0.6\" generator=\"{GENERATOR}\"><{kind}");
    if let Some(id) = draft.id {
        let _ = write!(out, " id=\"{id}\"");
    }
    if let Some(version) = draft.base_version {
        let _ = write!(out, " version=\"{version}\"");
    }
    let _ = write!(out, " changeset=\"{changeset_id}\"");
    if let ElementBody::Node { lat, lon } = &draft.body {
        let _ = write!(out, " lat=\"{lat:.7}\" lon=\"{lon:.7}\"");
    }
    out.push('>');

    match &draft.body {
        ElementBody::Node { .. } => {}
        ElementBody::Way { nodes } => {
            for node in nodes {
                let _ = write!(out, "<nd ref=\"{node}\"/>");
            }
        }
        ElementBody::Relation { members } => {
            for member in members {
                let _ = write!(
                    out,
                    "<member type=\"{}\" ref=\"{}\" role=\"{}\"/>",
                    member.kind,
                    member.id,
                    escape(&member.role)
                );
            }
        }
    }
    write_tags(&mut out, &draft.tags);
    let _ = write!(out, "</{kind}></osm>");
    out
}
