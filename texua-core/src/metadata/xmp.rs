//! XMP metadata for PDF/UA identification (ISO 32000-1 §14.3.2,
//! ISO 16684-1).
//!
//! The packet carries exactly what PDF/UA-1 requires from this tool:
//! `dc:title` (§7.1 — the title shown instead of the filename) and
//! `pdfuaid:part = 1` (§5 — the conformance claim). Reading back only
//! needs the title, which the HTTP summary and tests use.

use chrono::{SecondsFormat, Utc};
use quick_xml::escape::{resolve_xml_entity, unescape};
use quick_xml::events::Event;
use quick_xml::Reader;

const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
const NS_XMP: &str = "http://ns.adobe.com/xap/1.0/";
const NS_PDFUAID: &str = "http://www.aiim.org/pdfua/ns/id/";

/// Generate an XMP packet declaring the title and PDF/UA-1 conformance.
pub fn xmp_packet(title: &str) -> String {
    let title = escape_xml(title);
    let date = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let bom = '\u{FEFF}';
    format!(
        r#"<?xpacket begin="{bom}" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about="" xmlns:dc="{NS_DC}">
   <dc:title>
    <rdf:Alt>
     <rdf:li xml:lang="x-default">{title}</rdf:li>
    </rdf:Alt>
   </dc:title>
  </rdf:Description>
  <rdf:Description rdf:about="" xmlns:pdfuaid="{NS_PDFUAID}">
   <pdfuaid:part>1</pdfuaid:part>
  </rdf:Description>
  <rdf:Description rdf:about="" xmlns:xmp="{NS_XMP}">
   <xmp:ModifyDate>{date}</xmp:ModifyDate>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#
    )
}

/// Extract `dc:title` from an XMP packet, if present.
pub fn read_title(packet: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(packet);

    let mut in_title = false;
    let mut in_li = false;
    let mut buffer = Vec::new();
    let mut title = String::new();

    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(ref element)) => {
                let name = element.name();
                let local = local_name(name.as_ref());
                if local == b"title" {
                    in_title = true;
                } else if in_title && local == b"li" {
                    in_li = true;
                }
            }
            Ok(Event::End(ref element)) => {
                let name = element.name();
                let local = local_name(name.as_ref());
                if local == b"title" {
                    in_title = false;
                } else if local == b"li" {
                    if in_li {
                        return Some(title.trim().to_string());
                    }
                    in_li = false;
                }
            }
            Ok(Event::Text(text)) if in_title && in_li => {
                if let Ok(decoded) = text.decode() {
                    if let Ok(unescaped) = unescape(&decoded) {
                        title.push_str(&unescaped);
                    }
                }
            }
            Ok(Event::GeneralRef(ref reference)) if in_title && in_li => {
                if let Some(name) = reference.decode().ok() {
                    if let Some(resolved) = resolve_xml_entity(&name) {
                        title.push_str(resolved);
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buffer.clear();
    }
}

/// Does the packet claim PDF/UA-1 conformance?
pub fn declares_pdfua1(packet: &[u8]) -> bool {
    let mut reader = Reader::from_reader(packet);
    reader.config_mut().trim_text(true);

    let mut in_part = false;
    let mut buffer = Vec::new();
    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(ref element)) => {
                let name = element.name();
                if local_name(name.as_ref()) == b"part" {
                    in_part = true;
                }
            }
            Ok(Event::End(_)) => in_part = false,
            Ok(Event::Text(text)) if in_part => {
                return text
                    .decode()
                    .ok()
                    .and_then(|t| unescape(&t).ok().map(|t| t.trim() == "1"))
                    .unwrap_or(false);
            }
            Ok(Event::Eof) => return false,
            Err(_) => return false,
            _ => {}
        }
        buffer.clear();
    }
}

fn local_name(qualified: &[u8]) -> &[u8] {
    match qualified.iter().rposition(|&b| b == b':') {
        Some(position) => &qualified[position + 1..],
        None => qualified,
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_declares_part_1() {
        let packet = xmp_packet("My Document");
        assert!(packet.contains("<pdfuaid:part>1</pdfuaid:part>"));
        assert!(declares_pdfua1(packet.as_bytes()));
    }

    #[test]
    fn test_title_round_trip() {
        let packet = xmp_packet("A Study of <Things> & Stuff");
        assert_eq!(
            read_title(packet.as_bytes()).as_deref(),
            Some("A Study of <Things> & Stuff")
        );
    }

    #[test]
    fn test_read_title_missing() {
        assert_eq!(read_title(b"<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>"), None);
    }
}
