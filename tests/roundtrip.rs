//! Byte-stability, persistence, and printing round-trips.

use std::io::Write;

use colson::marker::ColumnType;
use colson::{Document, RecordKey, Revise};

fn sample_document() -> Document {
    let mut doc = Document::new(RecordKey::Unsigned(17)).unwrap();
    doc.edit(|ins| {
        ins.insert_object(0, |obj| {
            obj.prop_string("name", "sensor-1")?;
            obj.prop_null("location")?;
            obj.prop_column("readings", ColumnType::U16, 4, |col| {
                col.insert_u16(101)?;
                col.insert_u16(99)?;
                col.insert_null()
            })?;
            obj.prop_array("tags", 0, |tags| {
                tags.insert_string("indoor")?;
                tags.insert_true()
            })
        })
    })
    .unwrap();
    doc
}

#[test]
fn decode_reencode_is_byte_identical() {
    let doc = sample_document();
    let bytes = doc.as_bytes().to_vec();

    let reopened = Document::from_bytes(&bytes).unwrap();
    assert_eq!(reopened.as_bytes(), bytes.as_slice());

    let again = Document::from_bytes(reopened.as_bytes()).unwrap();
    assert_eq!(again.as_bytes(), bytes.as_slice());
}

#[test]
fn open_from_file_via_mmap() {
    let doc = sample_document();

    let mut temp = tempfile::NamedTempFile::new().unwrap();
    temp.write_all(doc.as_bytes()).unwrap();
    temp.flush().unwrap();

    let mut opened = Document::open(temp.path()).unwrap();
    assert_eq!(opened.as_bytes(), doc.as_bytes());
    assert_eq!(opened.find("$.name").unwrap().string().unwrap(), "sensor-1");
}

#[test]
fn save_then_open_roundtrip() {
    let doc = sample_document();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("record.colson");

    doc.save(&path).unwrap();
    let opened = Document::open(&path).unwrap();
    assert_eq!(opened.as_bytes(), doc.as_bytes());
}

#[test]
fn repeated_update_with_same_value_is_byte_identical() {
    let doc = sample_document();

    let once = Revise::update_one_set_u16(&doc, "$.readings[0]", 500).unwrap();
    let twice = Revise::update_one_set_u16(&once, "$.readings[0]", 500).unwrap();

    assert_eq!(once.as_bytes(), twice.as_bytes());
}

#[test]
fn revision_updates_commit_hash_deterministically() {
    let doc = sample_document();
    assert_eq!(doc.commit_hash().unwrap(), 0);

    let a = Revise::update_one_set_u16(&doc, "$.readings[0]", 7).unwrap();
    let b = Revise::update_one_set_u16(&doc, "$.readings[0]", 7).unwrap();
    assert_ne!(a.commit_hash().unwrap(), 0);
    assert_eq!(a.commit_hash().unwrap(), b.commit_hash().unwrap());

    let c = Revise::update_one_set_u16(&doc, "$.readings[0]", 8).unwrap();
    assert_ne!(a.commit_hash().unwrap(), c.commit_hash().unwrap());
}

#[test]
fn abandoned_revision_leaves_base_untouched() {
    let mut doc = sample_document();
    let before = doc.as_bytes().to_vec();

    {
        let mut revise = Revise::begin(&doc);
        revise.set_u16("$.readings[0]", 9999).unwrap();
        // Dropped without end(): the draft is discarded.
    }

    assert_eq!(doc.as_bytes(), before.as_slice());
    assert_eq!(doc.find("$.readings[0]").unwrap().unsigned().unwrap(), 101);
}

#[test]
fn column_append_then_remove_preserves_layout() {
    let mut doc = Document::new(RecordKey::None).unwrap();
    doc.edit(|ins| {
        ins.insert_column(ColumnType::U32, 4, |col| {
            col.insert_u32(1)?;
            col.insert_u32(2)
        })
    })
    .unwrap();
    let before = doc.as_bytes().len();

    let mut body = doc.body().unwrap();
    body.next().unwrap();
    let mut col = body.column_value().unwrap();
    {
        let mut ins = col.insert_begin();
        ins.insert_u32(3).unwrap();
    }
    assert_eq!(col.num_elements(), 3);
    col.remove(2).unwrap();
    assert_eq!(col.num_elements(), 2);
    assert_eq!(col.capacity(), 4);
    assert_eq!(col.u32_value(0).unwrap(), 1);
    assert_eq!(col.u32_value(1).unwrap(), 2);
    drop(col);
    drop(body);

    assert_eq!(doc.as_bytes().len(), before);
    Document::from_bytes(doc.as_bytes()).unwrap();
}

// ── Printing boundaries ────────────────────────────────────────────

#[test]
fn empty_containers_print_as_json() {
    let mut doc = Document::new(RecordKey::None).unwrap();
    assert_eq!(doc.to_json().unwrap(), "[]");

    let mut doc = Document::new(RecordKey::None).unwrap();
    doc.edit(|ins| ins.insert_object(0, |_| Ok(()))).unwrap();
    // Unit object at the record root prints as the record body.
    assert_eq!(doc.to_json().unwrap(), "{}");
}

#[test]
fn unit_column_prints_as_record_body() {
    let mut doc = Document::new(RecordKey::None).unwrap();
    doc.edit(|ins| {
        ins.insert_column(ColumnType::I8, 3, |col| {
            col.insert_i8(-1)?;
            col.insert_null()?;
            col.insert_i8(2)
        })
    })
    .unwrap();
    assert_eq!(doc.to_json().unwrap(), "[-1,null,2]");
}

#[test]
fn printed_output_is_valid_json() {
    let mut doc = sample_document();
    let text = doc.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["name"], "sensor-1");
    assert_eq!(value["readings"][0], 101);
    assert!(value["readings"][2].is_null());
    assert_eq!(value["tags"][1], true);
}

#[test]
fn find_result_to_json() {
    let mut doc = sample_document();
    let mut find = doc.find("$.tags").unwrap();
    let mut p = colson::printer::CompactJsonPrinter::new();
    find.to_json(&mut p).unwrap();
    assert_eq!(p.finish(), r#"["indoor",true]"#);
}
