//! # MIME
//!
//! Module dedicated to MIME body structures: the part tree returned
//! by the server, its flattening, and the classification of
//! attachment parts.

use dmarc::ArchiveKind;
use mail_parser::MessageParser;
use tracing::{debug, trace};

/// The filename used when a part declares none.
pub const DEFAULT_ATTACHMENT_FILENAME: &str = "attachment";

/// One node of a message body structure.
///
/// This is a simplified, owned version of the IMAP `BODYSTRUCTURE`:
/// only what is needed to locate and fetch attachments is kept.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PartNode {
    /// The IMAP section path of the part (`1`, `2.1`…).
    ///
    /// The root of a multipart message has no section path.
    pub part: Option<String>,

    pub mime_type: String,
    pub mime_subtype: String,

    /// The content type parameters (`name`, `charset`…).
    pub parameters: Vec<(String, String)>,

    /// The content disposition type (`inline`, `attachment`…).
    pub disposition: Option<String>,

    /// The content disposition parameters (`filename`…).
    pub disposition_parameters: Vec<(String, String)>,

    /// The content transfer encoding (`base64`, `7bit`…).
    pub encoding: Option<String>,

    /// The declared size of the encoded part, in bytes.
    pub size: Option<u32>,

    pub child_nodes: Vec<PartNode>,
}

impl PartNode {
    /// Return `true` if the part is disposed as an attachment.
    pub fn is_attachment(&self) -> bool {
        self.disposition
            .as_deref()
            .map(|disp| disp.eq_ignore_ascii_case("attachment"))
            .unwrap_or_default()
    }

    /// Resolve the filename of the part.
    ///
    /// The disposition `filename` parameter wins over the content
    /// type `name` parameter.
    pub fn filename(&self) -> String {
        find_param(&self.disposition_parameters, "filename")
            .or_else(|| find_param(&self.parameters, "name"))
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| DEFAULT_ATTACHMENT_FILENAME.to_owned())
    }

    /// The lowercased `type/subtype` MIME type of the part.
    pub fn mime(&self) -> String {
        format!("{}/{}", self.mime_type, self.mime_subtype).to_lowercase()
    }
}

fn find_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Flatten the given body structure, depth first.
///
/// Parents come before their children and siblings keep their
/// order. The tree is walked using an explicit stack, so nesting
/// depth only costs heap memory.
pub fn flatten(root: Option<&PartNode>) -> Vec<&PartNode> {
    let mut parts = Vec::new();
    let mut stack: Vec<&PartNode> = root.into_iter().collect();

    while let Some(node) = stack.pop() {
        parts.push(node);
        stack.extend(node.child_nodes.iter().rev());
    }

    trace!(count = parts.len(), "flattened body structure");
    parts
}

/// Assemble a tree from nodes listed depth first, each one along
/// with the index of its parent.
///
/// This is the reverse of [`flatten`]: parents must come before their
/// children, and siblings keep their order. The first node is the
/// root. Returns `None` when there is no node.
pub fn assemble(mut nodes: Vec<(PartNode, Option<usize>)>) -> Option<PartNode> {
    // children always sit after their parent, so popping from the
    // end attaches every subtree before its parent is taken
    while nodes.len() > 1 {
        let Some((mut node, parent)) = nodes.pop() else {
            break;
        };

        node.child_nodes.reverse();

        match parent.and_then(|parent| nodes.get_mut(parent)) {
            Some((parent, _)) => parent.child_nodes.push(node),
            None => debug!(part = ?node.part, "orphan body part, skipping it"),
        }
    }

    let (mut root, _) = nodes.pop()?;
    root.child_nodes.reverse();
    Some(root)
}

/// An attachment part of a message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttachmentPart {
    /// The IMAP section path used to fetch the content.
    pub part: Option<String>,
    pub filename: String,
    pub mime: String,
    pub size: u32,
    pub encoding: Option<String>,
    /// The report container, `None` if the attachment is not a
    /// DMARC report candidate.
    pub kind: Option<ArchiveKind>,
}

impl AttachmentPart {
    /// Return `true` if the attachment may hold a DMARC report.
    pub fn is_relevant(&self) -> bool {
        self.kind.is_some()
    }
}

impl From<&PartNode> for AttachmentPart {
    fn from(node: &PartNode) -> Self {
        let filename = node.filename();
        let mime = node.mime();
        let kind = ArchiveKind::detect(&filename, &mime);

        Self {
            part: node.part.clone(),
            filename,
            mime,
            size: node.size.unwrap_or_default(),
            encoding: node.encoding.clone(),
            kind,
        }
    }
}

/// Collect the attachment parts of the given body structure, in
/// depth-first order.
pub fn attachments(root: Option<&PartNode>) -> Vec<AttachmentPart> {
    let attachments: Vec<_> = flatten(root)
        .into_iter()
        .filter(|node| node.is_attachment())
        .map(AttachmentPart::from)
        .collect();

    debug!(count = attachments.len(), "found attachment parts");
    attachments
}

/// Decode the content transfer encoding of a fetched part.
///
/// The fetched section carries no header, so a minimal one is
/// rebuilt before handing the part to the MIME parser. Unknown or
/// identity encodings are returned as is.
pub fn decode_part(raw: Vec<u8>, encoding: Option<&str>) -> Vec<u8> {
    let encoding = match encoding.map(str::to_ascii_lowercase) {
        Some(encoding) if encoding == "base64" || encoding == "quoted-printable" => encoding,
        _ => return raw,
    };

    let mut buf = format!(
        "Content-Type: application/octet-stream\r\nContent-Transfer-Encoding: {encoding}\r\n\r\n"
    )
    .into_bytes();
    buf.extend_from_slice(&raw);

    let decoded = MessageParser::new()
        .parse(&buf)
        .and_then(|msg| msg.parts.first().map(|part| part.contents().to_vec()));

    match decoded {
        Some(decoded) => decoded,
        None => {
            debug!(encoding, "cannot decode part, keeping raw content");
            raw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{assemble, attachments, decode_part, flatten, PartNode};

    fn leaf(part: &str) -> PartNode {
        PartNode {
            part: Some(part.into()),
            mime_type: "text".into(),
            mime_subtype: "plain".into(),
            ..Default::default()
        }
    }

    fn multi(part: Option<&str>, child_nodes: Vec<PartNode>) -> PartNode {
        PartNode {
            part: part.map(ToOwned::to_owned),
            mime_type: "multipart".into(),
            mime_subtype: "mixed".into(),
            child_nodes,
            ..Default::default()
        }
    }

    fn paths(parts: Vec<&PartNode>) -> Vec<Option<&str>> {
        parts.into_iter().map(|p| p.part.as_deref()).collect()
    }

    #[test]
    fn flatten_absent_root() {
        assert!(flatten(None).is_empty());
    }

    #[test]
    fn flatten_single_node() {
        let root = leaf("1");
        assert_eq!(paths(flatten(Some(&root))), vec![Some("1")]);
    }

    #[test]
    fn flatten_depth_first_parents_first() {
        let root = multi(
            None,
            vec![
                leaf("1"),
                multi(Some("2"), vec![leaf("2.1"), multi(Some("2.2"), vec![leaf("2.2.1")])]),
                leaf("3"),
            ],
        );

        assert_eq!(
            paths(flatten(Some(&root))),
            vec![
                None,
                Some("1"),
                Some("2"),
                Some("2.1"),
                Some("2.2"),
                Some("2.2.1"),
                Some("3"),
            ]
        );
    }

    #[test]
    fn flatten_deep_nesting() {
        let mut root = leaf("x");
        for _ in 0..100_000 {
            root = multi(Some("x"), vec![root]);
        }

        assert_eq!(flatten(Some(&root)).len(), 100_001);

        // dropping such a tree recurses, so unwind it by hand
        let mut node = root;
        while let Some(child) = node.child_nodes.pop() {
            node = child;
        }
    }

    #[test]
    fn assemble_reverses_flatten() {
        let root = multi(
            None,
            vec![
                leaf("1"),
                multi(Some("2"), vec![leaf("2.1"), multi(Some("2.2"), vec![leaf("2.2.1")])]),
                leaf("3"),
            ],
        );

        let parents = [None, Some(0), Some(0), Some(2), Some(2), Some(4), Some(0)];
        let nodes = flatten(Some(&root))
            .into_iter()
            .zip(parents)
            .map(|(node, parent)| {
                let node = PartNode {
                    child_nodes: Vec::new(),
                    ..node.clone()
                };
                (node, parent)
            })
            .collect();

        assert_eq!(assemble(nodes), Some(root));
    }

    #[test]
    fn assemble_empty() {
        assert_eq!(assemble(Vec::new()), None);
    }

    #[test]
    fn assemble_deep_nesting() {
        let nodes = (0..100_000usize)
            .map(|i| (multi(Some("x"), Vec::new()), i.checked_sub(1)))
            .collect();

        let mut node = assemble(nodes).unwrap();
        let mut depth = 1;

        // dropping such a tree recurses, so unwind it by hand
        while let Some(child) = node.child_nodes.pop() {
            node = child;
            depth += 1;
        }

        assert_eq!(depth, 100_000);
    }

    #[test]
    fn classify_attachments() {
        let mut report = leaf("2");
        report.mime_type = "APPLICATION".into();
        report.mime_subtype = "GZIP".into();
        report.disposition = Some("Attachment".into());
        report.disposition_parameters = vec![("FILENAME".into(), "report.xml.gz".into())];
        report.parameters = vec![("name".into(), "ignored.xml".into())];
        report.size = Some(1234);

        let mut named = leaf("3");
        named.mime_type = "application".into();
        named.mime_subtype = "zip".into();
        named.disposition = Some("attachment".into());
        named.parameters = vec![("name".into(), "report.zip".into())];

        let mut anonymous = leaf("4");
        anonymous.mime_type = "image".into();
        anonymous.mime_subtype = "png".into();
        anonymous.disposition = Some("attachment".into());

        let mut inline = leaf("5");
        inline.disposition = Some("inline".into());

        let root = multi(None, vec![leaf("1"), report, named, anonymous, inline]);
        let found = attachments(Some(&root));

        assert_eq!(found.len(), 3);

        assert_eq!(found[0].filename, "report.xml.gz");
        assert_eq!(found[0].mime, "application/gzip");
        assert_eq!(found[0].size, 1234);
        assert_eq!(found[0].kind, Some(dmarc::ArchiveKind::Gzip));

        assert_eq!(found[1].filename, "report.zip");
        assert_eq!(found[1].size, 0);
        assert_eq!(found[1].kind, Some(dmarc::ArchiveKind::Zip));

        assert_eq!(found[2].filename, "attachment");
        assert_eq!(found[2].mime, "image/png");
        assert!(!found[2].is_relevant());
    }

    #[test]
    fn decode_base64_part() {
        let raw = b"PGZlZWRiYWNrPjwv\r\nZmVlZGJhY2s+\r\n".to_vec();
        assert_eq!(
            decode_part(raw, Some("BASE64")),
            b"<feedback></feedback>".to_vec()
        );
    }

    #[test]
    fn decode_identity_part() {
        let raw = b"<feedback/>".to_vec();
        assert_eq!(decode_part(raw.clone(), Some("7bit")), raw);
        assert_eq!(decode_part(raw.clone(), None), raw);
    }
}
