use colson::{Document, RecordKey};

fn main() {
    let mut doc = Document::new(RecordKey::Unsigned(1)).unwrap();
    doc.edit(|ins| {
        ins.insert_u8(1)?;
        ins.insert_string("two")
    }).unwrap();
    let bytes = doc.as_bytes();
    println!("len={}", bytes.len());
    println!("{:02x?}", bytes);
}
