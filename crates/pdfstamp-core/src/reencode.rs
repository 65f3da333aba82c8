//! Document re-encoding: stamp signature images onto pages
//!
//! The original is always re-read from its source, so the output never
//! depends on a buffer another step may have consumed. Each distinct
//! signature image becomes one image XObject (with a soft mask for its
//! alpha) shared by every stamp that uses it.

use crate::config::{SignerConfig, StampSize};
use crate::coords::{map_to_document_space, stamp_rect, PdfRect};
use crate::document::DocumentSource;
use crate::error::{EncodeError, Result, StampError};
use crate::placement::Placement;
use crate::raster::{inherited, Page};
use crate::signature::SignatureImage;
use flate2::{write::ZlibEncoder, Compression};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

const XOBJECT_PREFIX: &str = "PdfStampSig";

#[derive(Debug, Clone)]
pub struct Reencoder {
    stamp: StampSize,
    compress_images: bool,
}

impl Reencoder {
    pub fn new(config: &SignerConfig) -> Self {
        Self {
            stamp: config.stamp,
            compress_images: config.compress_images,
        }
    }

    pub fn with_stamp(stamp: StampSize) -> Self {
        Self {
            stamp,
            compress_images: true,
        }
    }

    /// Stamp every placement onto a fresh copy of the source document.
    ///
    /// `pages` are the records the placements were made against. A placement
    /// whose page no longer exists in the document is logged and skipped;
    /// any other failure aborts the whole encode.
    pub fn reencode(
        &self,
        source: &dyn DocumentSource,
        placements: &[Placement],
        pages: &[Page],
    ) -> Result<Vec<u8>> {
        let bytes = source.read_bytes()?;
        if placements.is_empty() {
            // No changes, return the fresh copy
            return Ok(bytes);
        }

        let mut doc = Document::load_mem(&bytes).map_err(EncodeError::from)?;
        let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();

        // Map everything up front so a bad placement fails before any edit
        let mut stamps: BTreeMap<usize, Vec<(PdfRect, &Arc<SignatureImage>)>> = BTreeMap::new();
        for placement in placements {
            if placement.page >= page_ids.len() {
                tracing::warn!(
                    "Skipping placement {}: page {} not in document ({} pages)",
                    placement.id,
                    placement.page,
                    page_ids.len()
                );
                continue;
            }
            let page = pages
                .get(placement.page)
                .ok_or(StampError::UnmappedPage {
                    page: placement.page,
                })?;
            let rect = stamp_rect(map_to_document_space(placement, page)?, &self.stamp);
            if ![rect.x, rect.y, rect.width, rect.height]
                .iter()
                .all(|v| v.is_finite())
            {
                return Err(EncodeError::Structure(format!(
                    "Placement {} maps to a non-finite stamp rectangle",
                    placement.id
                ))
                .into());
            }
            tracing::debug!(
                "Placement {} on page {} -> ({:.2}, {:.2}) {}x{}",
                placement.id,
                placement.page,
                rect.x,
                rect.y,
                rect.width,
                rect.height
            );
            stamps
                .entry(placement.page)
                .or_default()
                .push((rect, &placement.signature));
        }

        let mut embedded: Vec<(&Arc<SignatureImage>, ObjectId)> = Vec::new();
        let mut stamped = 0usize;

        for (page_index, page_stamps) in &stamps {
            let page_id = page_ids[*page_index];
            let mut names: Vec<(ObjectId, String)> = Vec::new();
            let mut ops = String::new();

            for (rect, image) in page_stamps {
                let image_id = match embedded.iter().find(|(e, _)| Arc::ptr_eq(e, image)) {
                    Some((_, id)) => *id,
                    None => {
                        let id = self.embed_image(&mut doc, image)?;
                        embedded.push((*image, id));
                        id
                    }
                };

                let name = match names.iter().find(|(id, _)| *id == image_id) {
                    Some((_, name)) => name.clone(),
                    None => {
                        let xobjects = xobjects_mut(&mut doc, page_id)?;
                        let name = unique_name(xobjects);
                        xobjects.set(name.as_str(), Object::Reference(image_id));
                        names.push((image_id, name.clone()));
                        name
                    }
                };

                ops.push_str(&draw_image_ops(rect, &name)?);
                stamped += 1;
            }

            append_wrapped_content(&mut doc, page_id, ops.into_bytes())?;
        }

        let mut output = Vec::new();
        doc.save_to(&mut output).map_err(EncodeError::from)?;

        tracing::info!(
            "Stamped {} signatures on {} pages ({} bytes)",
            stamped,
            stamps.len(),
            output.len()
        );
        Ok(output)
    }

    /// Add the signature as an RGB image XObject with a DeviceGray soft mask
    fn embed_image(
        &self,
        doc: &mut Document,
        image: &SignatureImage,
    ) -> std::result::Result<ObjectId, EncodeError> {
        let (rgb, alpha) = image.split_channels();

        let smask_id = if image.has_transparency() {
            let smask = self.image_stream(image, "DeviceGray", alpha, None)?;
            Some(doc.add_object(smask))
        } else {
            None
        };

        let stream = self.image_stream(image, "DeviceRGB", rgb, smask_id)?;
        Ok(doc.add_object(stream))
    }

    fn image_stream(
        &self,
        image: &SignatureImage,
        color_space: &str,
        data: Vec<u8>,
        smask: Option<ObjectId>,
    ) -> std::result::Result<Stream, EncodeError> {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width() as i64,
            "Height" => image.height() as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
        };
        if let Some(id) = smask {
            dict.set("SMask", Object::Reference(id));
        }

        let content = if self.compress_images {
            dict.set("Filter", "FlateDecode");
            deflate(&data)?
        } else {
            data
        };
        Ok(Stream::new(dict, content))
    }
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn draw_image_ops(rect: &PdfRect, name: &str) -> std::result::Result<String, EncodeError> {
    Ok(format!(
        "q {} 0 0 {} {} {} cm /{} Do Q\n",
        format_number(rect.width)?,
        format_number(rect.height)?,
        format_number(rect.x)?,
        format_number(rect.y)?,
        name
    ))
}

/// Content stream number: integers without a fraction, otherwise up to 4
/// decimals. PDF has no spelling for NaN or infinity.
fn format_number(value: f64) -> std::result::Result<String, EncodeError> {
    if !value.is_finite() {
        return Err(EncodeError::Structure(format!(
            "Cannot write {} as a PDF number",
            value
        )));
    }
    if (value - value.round()).abs() < 1e-6 {
        Ok(format!("{}", value.round() as i64))
    } else {
        let text = format!("{:.4}", value);
        Ok(text.trim_end_matches('0').trim_end_matches('.').to_string())
    }
}

fn unique_name(xobjects: &Dictionary) -> String {
    let mut n = 0usize;
    loop {
        let name = format!("{}{}", XOBJECT_PREFIX, n);
        if !xobjects.has(name.as_bytes()) {
            return name;
        }
        n += 1;
    }
}

fn structure(message: &str) -> EncodeError {
    EncodeError::Structure(message.to_string())
}

fn page_dict(doc: &Document, page_id: ObjectId) -> std::result::Result<&Dictionary, EncodeError> {
    doc.get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|_| structure("Page is not a dictionary"))
}

fn page_dict_mut(
    doc: &mut Document,
    page_id: ObjectId,
) -> std::result::Result<&mut Dictionary, EncodeError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| structure("Page is not a dictionary"))
}

/// Where a page's Resources dictionary lives
enum ResourcesAt {
    /// Indirect object referenced from the page
    Object(ObjectId),
    /// Inline in the page dictionary
    Page,
}

fn resources_location(
    doc: &mut Document,
    page_id: ObjectId,
) -> std::result::Result<ResourcesAt, EncodeError> {
    let page = page_dict(doc, page_id)?;
    let copied = match page.get(b"Resources") {
        Ok(Object::Reference(id)) => return Ok(ResourcesAt::Object(*id)),
        Ok(Object::Dictionary(_)) => return Ok(ResourcesAt::Page),
        Ok(_) => return Err(structure("Page Resources is not a dictionary")),
        // Inherited from the page tree: give the page its own copy
        Err(_) => match inherited(doc, page, b"Resources") {
            Some(Object::Reference(id)) => doc
                .get_object(*id)
                .and_then(Object::as_dict)
                .cloned()
                .unwrap_or_else(|_| Dictionary::new()),
            Some(Object::Dictionary(dict)) => dict.clone(),
            _ => Dictionary::new(),
        },
    };
    page_dict_mut(doc, page_id)?.set("Resources", copied);
    Ok(ResourcesAt::Page)
}

fn resources_mut<'a>(
    doc: &'a mut Document,
    page_id: ObjectId,
    at: &ResourcesAt,
) -> std::result::Result<&'a mut Dictionary, EncodeError> {
    match at {
        ResourcesAt::Object(id) => doc
            .get_object_mut(*id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| structure("Resources is not a dictionary")),
        ResourcesAt::Page => page_dict_mut(doc, page_id)?
            .get_mut(b"Resources")
            .and_then(Object::as_dict_mut)
            .map_err(|_| structure("Resources is not a dictionary")),
    }
}

/// The page's XObject resource dictionary, created if missing
fn xobjects_mut(
    doc: &mut Document,
    page_id: ObjectId,
) -> std::result::Result<&mut Dictionary, EncodeError> {
    let at = resources_location(doc, page_id)?;

    let shared = match resources_mut(doc, page_id, &at)?.get(b"XObject") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    if let Some(id) = shared {
        return doc
            .get_object_mut(id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| structure("XObject resources are not a dictionary"));
    }

    let resources = resources_mut(doc, page_id, &at)?;
    if !matches!(resources.get(b"XObject"), Ok(Object::Dictionary(_))) {
        resources.set("XObject", Dictionary::new());
    }
    resources
        .get_mut(b"XObject")
        .and_then(Object::as_dict_mut)
        .map_err(|_| structure("XObject resources are not a dictionary"))
}

/// Wrap the page's existing content in q/Q and append `ops` after it, so
/// the stamps draw in default user space whatever the page left on the
/// graphics state stack.
fn append_wrapped_content(
    doc: &mut Document,
    page_id: ObjectId,
    ops: Vec<u8>,
) -> std::result::Result<(), EncodeError> {
    let existing: Vec<Object> = match page_dict(doc, page_id)?.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(_) => return Err(structure("Page Contents is not a stream or array")),
        Err(_) => Vec::new(),
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    let ops = if existing.is_empty() {
        ops
    } else {
        let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        contents.push(Object::Reference(open_id));
        contents.extend(existing);

        let mut closed = b"\nQ\n".to_vec();
        closed.extend(ops);
        closed
    };

    let stamp_id = doc.add_object(Stream::new(Dictionary::new(), ops));
    contents.push(Object::Reference(stamp_id));
    page_dict_mut(doc, page_id)?.set("Contents", contents);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InMemorySource;

    fn create_test_pdf(num_pages: u32, with_content: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut kids = Vec::new();
        for i in 0..num_pages {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 400.into(), 600.into()],
            };
            if with_content {
                let text = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", i + 1);
                let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
                page.set("Contents", content_id);
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => num_pages as i64,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn pages(count: usize) -> Vec<Page> {
        (0..count)
            .map(|index| Page {
                index,
                rendered_width: 800.0,
                rendered_height: 1200.0,
                native_width: 400.0,
                native_height: 600.0,
                origin_x: 0.0,
                origin_y: 0.0,
                rotation: 0,
                raster: None,
            })
            .collect()
    }

    fn signature() -> Arc<SignatureImage> {
        Arc::new(
            SignatureImage::from_rgba(2, 1, vec![20, 20, 120, 255, 0, 0, 0, 0]).unwrap(),
        )
    }

    fn placement(id: u64, page: usize, x: f64, y: f64, sig: &Arc<SignatureImage>) -> Placement {
        Placement {
            id,
            page,
            x,
            y,
            signature: Arc::clone(sig),
        }
    }

    fn content(bytes: &[u8], page: u32) -> String {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = doc.get_pages()[&page];
        String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned()
    }

    /// Build a document from page dictionaries made by `build`, which gets
    /// the document and the id its page tree root will have
    fn pdf_from_pages<F>(build: F) -> Vec<u8>
    where
        F: FnOnce(&mut Document, ObjectId) -> Vec<Dictionary>,
    {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let dicts = build(&mut doc, pages_id);
        let count = dicts.len() as i64;
        let kids: Vec<Object> = dicts
            .into_iter()
            .map(|page| Object::Reference(doc.add_object(page)))
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn helvetica(doc: &mut Document) -> ObjectId {
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        })
    }

    fn text_stream(doc: &mut Document, text: &str) -> ObjectId {
        let ops = format!("BT /F1 12 Tf 72 500 Td ({}) Tj ET", text);
        doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()))
    }

    fn deref_dict<'a>(doc: &'a Document, obj: &'a Object) -> &'a Dictionary {
        match obj {
            Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
            other => other.as_dict().unwrap(),
        }
    }

    /// Check every stamp drawn on `page` resolves to an image through the
    /// page's own resources and that its fonts survived. Returns the names.
    fn stamp_names(bytes: &[u8], page: u32) -> Vec<String> {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = doc.get_pages()[&page];
        let text = String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned();

        let page_dict = doc.get_dictionary(page_id).unwrap();
        let resources = deref_dict(&doc, page_dict.get(b"Resources").unwrap());
        assert!(resources.has(b"Font"), "page {} lost its fonts", page);
        let xobjects = deref_dict(&doc, resources.get(b"XObject").unwrap());

        let names: Vec<String> = text
            .split_whitespace()
            .filter_map(|token| token.strip_prefix('/'))
            .filter(|name| name.starts_with(XOBJECT_PREFIX))
            .map(str::to_string)
            .collect();
        for name in &names {
            let image_id = xobjects
                .get(name.as_bytes())
                .and_then(Object::as_reference)
                .unwrap_or_else(|_| panic!("{} missing from page {} XObjects", name, page));
            let image = doc.get_object(image_id).and_then(Object::as_stream).unwrap();
            assert_eq!(
                image.dict.get(b"Subtype").and_then(Object::as_name).unwrap(),
                b"Image"
            );
        }
        names
    }

    #[test]
    fn test_shared_resources_object_serves_every_page() {
        let pdf = pdf_from_pages(|doc, pages_id| {
            let font_id = helvetica(doc);
            let resources_id = doc.add_object(dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            });
            (0..2)
                .map(|i| {
                    let content_id = text_stream(doc, &format!("Page {}", i + 1));
                    dictionary! {
                        "Type" => "Page",
                        "Parent" => pages_id,
                        "MediaBox" => vec![0.into(), 0.into(), 400.into(), 600.into()],
                        "Resources" => resources_id,
                        "Contents" => content_id,
                    }
                })
                .collect()
        });

        let source = InMemorySource::new("a.pdf", pdf);
        let sig = signature();
        let placements = vec![
            placement(1, 0, 100.0, 200.0, &sig),
            placement(2, 1, 100.0, 200.0, &sig),
        ];
        let out = Reencoder::with_stamp(StampSize::default())
            .reencode(&source, &placements, &pages(2))
            .unwrap();

        assert_eq!(stamp_names(&out, 1).len(), 1);
        assert_eq!(stamp_names(&out, 2).len(), 1);

        // Still one shared Resources object, edited in place
        let doc = Document::load_mem(&out).unwrap();
        let ids: Vec<ObjectId> = doc
            .get_pages()
            .values()
            .map(|id| {
                doc.get_dictionary(*id)
                    .unwrap()
                    .get(b"Resources")
                    .and_then(Object::as_reference)
                    .unwrap()
            })
            .collect();
        assert_eq!(ids[0], ids[1]);
    }

    #[test]
    fn test_referenced_xobject_dictionary_is_extended() {
        let pdf = pdf_from_pages(|doc, pages_id| {
            let font_id = helvetica(doc);
            let logo_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => 1,
                    "Height" => 1,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                vec![0],
            ));
            let xobjects_id = doc.add_object(dictionary! { "Im0" => logo_id });
            let content_id = text_stream(doc, "Invoice");
            vec![dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 400.into(), 600.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                    "XObject" => xobjects_id,
                },
                "Contents" => content_id,
            }]
        });

        let source = InMemorySource::new("a.pdf", pdf);
        let sig = signature();
        let out = Reencoder::with_stamp(StampSize::default())
            .reencode(&source, &[placement(1, 0, 100.0, 200.0, &sig)], &pages(1))
            .unwrap();

        assert_eq!(stamp_names(&out, 1), vec!["PdfStampSig0".to_string()]);

        let doc = Document::load_mem(&out).unwrap();
        let page = doc.get_dictionary(doc.get_pages()[&1]).unwrap();
        let resources = page.get(b"Resources").and_then(Object::as_dict).unwrap();
        let xobjects_id = resources
            .get(b"XObject")
            .and_then(Object::as_reference)
            .unwrap();
        let xobjects = doc.get_dictionary(xobjects_id).unwrap();
        assert!(xobjects.has(b"Im0"));
        assert!(xobjects.has(b"PdfStampSig0"));
    }

    fn two_part_page(doc: &mut Document, pages_id: ObjectId, indirect_array: bool) -> Dictionary {
        let font_id = helvetica(doc);
        let parts = vec![
            Object::Reference(text_stream(doc, "Part one")),
            Object::Reference(text_stream(doc, "Part two")),
        ];
        let contents = if indirect_array {
            Object::Reference(doc.add_object(Object::Array(parts)))
        } else {
            Object::Array(parts)
        };
        dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 400.into(), 600.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "Contents" => contents,
        }
    }

    #[test]
    fn test_contents_array_is_wrapped() {
        for indirect_array in [false, true] {
            let pdf = pdf_from_pages(|doc, pages_id| {
                vec![two_part_page(doc, pages_id, indirect_array)]
            });
            let source = InMemorySource::new("a.pdf", pdf);
            let sig = signature();
            let out = Reencoder::with_stamp(StampSize::default())
                .reencode(&source, &[placement(1, 0, 100.0, 200.0, &sig)], &pages(1))
                .unwrap();

            let text = content(&out, 1);
            assert!(text.starts_with("q\n"), "{}", text);
            let one = text.find("(Part one) Tj").unwrap();
            let two = text.find("(Part two) Tj").unwrap();
            let stamp = text
                .find("\nQ\nq 100 0 0 50 0 475 cm /PdfStampSig0 Do Q")
                .unwrap_or_else(|| panic!("stamp missing: {}", text));
            assert!(one < two && two < stamp, "{}", text);
            assert_eq!(stamp_names(&out, 1).len(), 1);
        }
    }

    #[test]
    fn test_no_placements_returns_original() {
        let pdf = create_test_pdf(2, true);
        let source = InMemorySource::new("a.pdf", pdf.clone());
        let out = Reencoder::with_stamp(StampSize::default())
            .reencode(&source, &[], &pages(2))
            .unwrap();
        assert_eq!(out, pdf);
    }

    #[test]
    fn test_stamp_drawn_on_target_page_only() {
        let source = InMemorySource::new("a.pdf", create_test_pdf(2, true));
        let sig = signature();
        let out = Reencoder::with_stamp(StampSize::default())
            .reencode(&source, &[placement(1, 0, 100.0, 200.0, &sig)], &pages(2))
            .unwrap();

        let first = content(&out, 1);
        assert!(first.starts_with("q\n"), "{}", first);
        assert!(first.contains("Q\nq 100 0 0 50 0 475 cm /PdfStampSig0 Do Q"), "{}", first);
        assert!(first.contains("(Page 1) Tj"));

        let second = content(&out, 2);
        assert!(!second.contains(" Do"), "{}", second);
    }

    #[test]
    fn test_inherited_resources_are_kept() {
        let source = InMemorySource::new("a.pdf", create_test_pdf(1, true));
        let sig = signature();
        let out = Reencoder::with_stamp(StampSize::default())
            .reencode(&source, &[placement(1, 0, 400.0, 600.0, &sig)], &pages(1))
            .unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let page_id = doc.get_pages()[&1];
        let page = doc.get_object(page_id).and_then(Object::as_dict).unwrap();
        let resources = page.get(b"Resources").and_then(Object::as_dict).unwrap();
        assert!(resources.has(b"Font"));
        let xobjects = resources.get(b"XObject").and_then(Object::as_dict).unwrap();
        assert!(xobjects.has(b"PdfStampSig0"));
    }

    #[test]
    fn test_image_embedded_once_per_signature() {
        let source = InMemorySource::new("a.pdf", create_test_pdf(2, false));
        let sig = signature();
        let placements = vec![
            placement(1, 0, 100.0, 100.0, &sig),
            placement(2, 0, 300.0, 300.0, &sig),
            placement(3, 1, 100.0, 100.0, &sig),
        ];
        let out = Reencoder::with_stamp(StampSize::default())
            .reencode(&source, &placements, &pages(2))
            .unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let rgb_images = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .filter(|s| {
                s.dict
                    .get(b"ColorSpace")
                    .and_then(Object::as_name)
                    .map(|n| n == b"DeviceRGB")
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(rgb_images, 1);

        let first = content(&out, 1);
        assert_eq!(first.matches("/PdfStampSig0 Do").count(), 2);
        // No prior content, so nothing to wrap
        assert!(!first.starts_with("q\n"));
    }

    #[test]
    fn test_out_of_range_page_is_skipped() {
        let pdf = create_test_pdf(1, true);
        let source = InMemorySource::new("a.pdf", pdf);
        let sig = signature();
        let placements = vec![
            placement(1, 0, 100.0, 200.0, &sig),
            placement(2, 5, 100.0, 200.0, &sig),
        ];
        let out = Reencoder::with_stamp(StampSize::default())
            .reencode(&source, &placements, &pages(1))
            .unwrap();
        let doc = Document::load_mem(&out).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert_eq!(content(&out, 1).matches(" Do Q").count(), 1);
    }

    #[test]
    fn test_unmapped_page_aborts() {
        let source = InMemorySource::new("a.pdf", create_test_pdf(1, true));
        let sig = signature();
        let mut records = pages(1);
        records[0].rendered_width = 0.0;
        let result = Reencoder::with_stamp(StampSize::default()).reencode(
            &source,
            &[placement(1, 0, 10.0, 10.0, &sig)],
            &records,
        );
        assert!(matches!(result, Err(StampError::UnmappedPage { page: 0 })));
    }

    #[test]
    fn test_unparseable_source_is_encode_error() {
        let source = InMemorySource::new("a.pdf", b"%PDF-1.7 not really".to_vec());
        let sig = signature();
        let result = Reencoder::with_stamp(StampSize::default()).reencode(
            &source,
            &[placement(1, 0, 10.0, 10.0, &sig)],
            &pages(1),
        );
        assert!(matches!(result, Err(StampError::Encode(_))));
    }

    #[test]
    fn test_soft_mask_and_compression() {
        let source = InMemorySource::new("a.pdf", create_test_pdf(1, false));
        let sig = signature();
        let out = Reencoder::with_stamp(StampSize::default())
            .reencode(&source, &[placement(1, 0, 10.0, 10.0, &sig)], &pages(1))
            .unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let image = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .find(|s| s.dict.has(b"SMask"))
            .unwrap();
        assert_eq!(
            image.dict.get(b"Filter").and_then(Object::as_name).unwrap(),
            b"FlateDecode"
        );
        assert_eq!(image.dict.get(b"Width").and_then(Object::as_i64).unwrap(), 2);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(100.0).unwrap(), "100");
        assert_eq!(format_number(0.0).unwrap(), "0");
        assert_eq!(format_number(-0.0).unwrap(), "0");
        assert_eq!(format_number(475.5).unwrap(), "475.5");
        assert_eq!(format_number(1.0 / 3.0).unwrap(), "0.3333");
        assert_eq!(format_number(-12.25).unwrap(), "-12.25");
    }

    #[test]
    fn test_format_number_rejects_non_finite() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                format_number(value),
                Err(EncodeError::Structure(_))
            ));
        }
        let rect = PdfRect {
            x: f64::NAN,
            y: 570.0,
            width: 100.0,
            height: 50.0,
        };
        assert!(draw_image_ops(&rect, "PdfStampSig0").is_err());
    }

    #[test]
    fn test_non_finite_anchor_fails_encode() {
        let source = InMemorySource::new("a.pdf", create_test_pdf(1, true));
        let sig = signature();
        let result = Reencoder::with_stamp(StampSize::default()).reencode(
            &source,
            &[placement(1, 0, f64::NAN, 10.0, &sig)],
            &pages(1),
        );
        assert!(matches!(
            result,
            Err(StampError::Encode(EncodeError::Structure(_)))
        ));
    }

    #[test]
    fn test_infinite_stamp_size_fails_encode() {
        let source = InMemorySource::new("a.pdf", create_test_pdf(1, true));
        let sig = signature();
        let stamp = StampSize {
            width: f64::INFINITY,
            height: 50.0,
        };
        let result = Reencoder::with_stamp(stamp).reencode(
            &source,
            &[placement(1, 0, 100.0, 200.0, &sig)],
            &pages(1),
        );
        assert!(matches!(
            result,
            Err(StampError::Encode(EncodeError::Structure(_)))
        ));
    }
}
