//! S3 XML response rendering and request parsing.
//!
//! All S3 API responses are XML-encoded.  This module provides helpers
//! that produce the correct XML payloads using `quick-xml`, plus the
//! parser for the `CompleteMultipartUpload` request body.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use crate::errors::StorageError;
use crate::object::{ListMultipartsInfo, ListPartsInfo};

// ── Error response ──────────────────────────────────────────────────

/// Render an S3 `<Error>` XML document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>NoSuchBucket</Code>
///   <Message>Bucket not found: mybucket</Message>
///   <Resource>/mybucket</Resource>
///   <RequestId>abcd-1234</RequestId>
/// </Error>
/// ```
pub fn render_error(code: &str, message: &str, resource: &str, request_id: &str) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    write_decl(&mut writer);
    write_simple_element_group(
        &mut writer,
        "Error",
        &[
            ("Code", code),
            ("Message", message),
            ("Resource", resource),
            ("RequestId", request_id),
        ],
    );

    into_string(writer)
}

// ── InitiateMultipartUploadResult ───────────────────────────────────

/// Render the response for CreateMultipartUpload.
pub fn render_initiate_multipart_upload_result(
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    write_decl(&mut writer);
    let root = BytesStart::new("InitiateMultipartUploadResult")
        .with_attributes([("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/")]);
    writer.write_event(Event::Start(root)).expect("start root");

    write_text_element(&mut writer, "Bucket", bucket);
    write_text_element(&mut writer, "Key", key);
    write_text_element(&mut writer, "UploadId", upload_id);

    writer
        .write_event(Event::End(BytesEnd::new("InitiateMultipartUploadResult")))
        .expect("end root");

    into_string(writer)
}

// ── CompleteMultipartUploadResult ───────────────────────────────────

/// Render the response for CompleteMultipartUpload.
pub fn render_complete_multipart_upload_result(
    location: &str,
    bucket: &str,
    key: &str,
    etag: &str,
) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    write_decl(&mut writer);
    write_simple_element_group(
        &mut writer,
        "CompleteMultipartUploadResult",
        &[
            ("Location", location),
            ("Bucket", bucket),
            ("Key", key),
            ("ETag", etag),
        ],
    );

    into_string(writer)
}

// ── ListMultipartUploadsResult ──────────────────────────────────────

/// Render the response for ListMultipartUploads.
pub fn render_list_multipart_uploads_result(bucket: &str, info: &ListMultipartsInfo) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    write_decl(&mut writer);
    let root = BytesStart::new("ListMultipartUploadsResult")
        .with_attributes([("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/")]);
    writer.write_event(Event::Start(root)).expect("start root");

    write_text_element(&mut writer, "Bucket", bucket);
    write_text_element(&mut writer, "KeyMarker", &info.key_marker);
    write_text_element(&mut writer, "UploadIdMarker", &info.upload_id_marker);
    if !info.next_key_marker.is_empty() {
        write_text_element(&mut writer, "NextKeyMarker", &info.next_key_marker);
    }
    if !info.next_upload_id_marker.is_empty() {
        write_text_element(&mut writer, "NextUploadIdMarker", &info.next_upload_id_marker);
    }
    write_text_element(&mut writer, "MaxUploads", &info.max_uploads.to_string());
    write_text_element(
        &mut writer,
        "IsTruncated",
        if info.is_truncated { "true" } else { "false" },
    );
    if !info.prefix.is_empty() {
        write_text_element(&mut writer, "Prefix", &info.prefix);
    }
    if !info.delimiter.is_empty() {
        write_text_element(&mut writer, "Delimiter", &info.delimiter);
    }

    for upload in &info.uploads {
        writer
            .write_event(Event::Start(BytesStart::new("Upload")))
            .expect("start Upload");
        write_text_element(&mut writer, "Key", &upload.object);
        write_text_element(&mut writer, "UploadId", &upload.upload_id);
        write_text_element(&mut writer, "StorageClass", "STANDARD");
        write_text_element(&mut writer, "Initiated", &upload.initiated);
        writer
            .write_event(Event::End(BytesEnd::new("Upload")))
            .expect("end Upload");
    }

    for prefix in &info.common_prefixes {
        write_simple_element_group(&mut writer, "CommonPrefixes", &[("Prefix", prefix)]);
    }

    writer
        .write_event(Event::End(BytesEnd::new("ListMultipartUploadsResult")))
        .expect("end root");

    into_string(writer)
}

// ── ListPartsResult ─────────────────────────────────────────────────

/// Render the response for ListParts.
pub fn render_list_parts_result(info: &ListPartsInfo) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    write_decl(&mut writer);
    let root = BytesStart::new("ListPartsResult")
        .with_attributes([("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/")]);
    writer.write_event(Event::Start(root)).expect("start root");

    write_text_element(&mut writer, "Bucket", &info.bucket);
    write_text_element(&mut writer, "Key", &info.object);
    write_text_element(&mut writer, "UploadId", &info.upload_id);
    write_text_element(&mut writer, "StorageClass", "STANDARD");
    write_text_element(
        &mut writer,
        "PartNumberMarker",
        &info.part_number_marker.to_string(),
    );
    if info.is_truncated {
        write_text_element(
            &mut writer,
            "NextPartNumberMarker",
            &info.next_part_number_marker.to_string(),
        );
    }
    write_text_element(&mut writer, "MaxParts", &info.max_parts.to_string());
    write_text_element(
        &mut writer,
        "IsTruncated",
        if info.is_truncated { "true" } else { "false" },
    );

    for part in &info.parts {
        writer
            .write_event(Event::Start(BytesStart::new("Part")))
            .expect("start Part");
        write_text_element(&mut writer, "PartNumber", &part.part_number.to_string());
        write_text_element(&mut writer, "LastModified", &part.last_modified);
        write_text_element(&mut writer, "ETag", &format!("\"{}\"", part.etag));
        write_text_element(&mut writer, "Size", &part.size.to_string());
        writer
            .write_event(Event::End(BytesEnd::new("Part")))
            .expect("end Part");
    }

    writer
        .write_event(Event::End(BytesEnd::new("ListPartsResult")))
        .expect("end root");

    into_string(writer)
}

// ── CompleteMultipartUpload request body ────────────────────────────

/// Parse the `<CompleteMultipartUpload>` XML body into
/// `(PartNumber, ETag)` pairs, in document order.
pub fn parse_complete_multipart_upload(body: &[u8]) -> Result<Vec<(i32, String)>, StorageError> {
    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);

    let mut parts: Vec<(i32, String)> = Vec::new();
    let mut current_part_number: Option<i32> = None;
    let mut current_etag: Option<String> = None;
    let mut in_part = false;
    let mut current_tag = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag_name == "Part" {
                    in_part = true;
                    current_part_number = None;
                    current_etag = None;
                } else if in_part {
                    current_tag = tag_name;
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_part {
                    let text = e
                        .unescape()
                        .map_err(|_| StorageError::MalformedXml)?
                        .to_string();
                    match current_tag.as_str() {
                        "PartNumber" => current_part_number = text.parse::<i32>().ok(),
                        "ETag" => current_etag = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"Part" {
                    in_part = false;
                    match (current_part_number, current_etag.take()) {
                        (Some(part_number), Some(etag)) => parts.push((part_number, etag)),
                        _ => return Err(StorageError::MalformedXml),
                    }
                    current_tag.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(StorageError::MalformedXml),
            _ => {}
        }
        buf.clear();
    }

    if parts.is_empty() {
        return Err(StorageError::MalformedXml);
    }

    Ok(parts)
}

// ── Helpers ─────────────────────────────────────────────────────────

fn write_decl(writer: &mut Writer<Cursor<Vec<u8>>>) {
    writer
        .write_event(Event::Decl(quick_xml::events::BytesDecl::new(
            "1.0",
            Some("UTF-8"),
            None,
        )))
        .expect("xml decl");
}

/// Write a `<tag>text</tag>` element.
fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .expect("start element");
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .expect("element text");
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .expect("end element");
}

/// Write `<group><k1>v1</k1>...</group>`.
fn write_simple_element_group(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    group: &str,
    elements: &[(&str, &str)],
) {
    writer
        .write_event(Event::Start(BytesStart::new(group)))
        .expect("start group");
    for (tag, text) in elements {
        write_text_element(writer, tag, text);
    }
    writer
        .write_event(Event::End(BytesEnd::new(group)))
        .expect("end group");
}

fn into_string(writer: Writer<Cursor<Vec<u8>>>) -> String {
    String::from_utf8(writer.into_inner().into_inner()).expect("valid utf-8")
}

// ── Tests ───────────────────────────────────────────────────────────
