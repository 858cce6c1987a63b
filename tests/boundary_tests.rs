// Boundary Condition Tests for HadroDB
// Edge cases for key and value sizes, schema limits and scan block sizes

use hadrodb::record::MAX_KEY_LEN;
use hadrodb::schema::MAX_VARCHAR_LEN;
use hadrodb::{DataType, Error, Field, Options, RecordFormat, Schema, Value, DB};
use tempfile::TempDir;

fn text_schema() -> Schema {
    Schema::new(vec![Field::new("body", DataType::Varchar)]).unwrap()
}

#[test]
fn test_varchar_at_limit() {
    for format in [RecordFormat::Fixed, RecordFormat::SelfDescribing] {
        let dir = TempDir::new().unwrap();
        let db = DB::open(dir.path(), text_schema(), Options::default().record_format(format)).unwrap();

        let body = "x".repeat(MAX_VARCHAR_LEN);
        assert_eq!(body.len(), 65_535);
        db.set_values(b"big", vec![body.clone().into()]).unwrap();
        assert_eq!(db.get(b"big").unwrap().get(0).and_then(Value::as_str), Some(body.as_str()));
    }
}

#[test]
fn test_varchar_over_limit() {
    for format in [RecordFormat::Fixed, RecordFormat::SelfDescribing] {
        let dir = TempDir::new().unwrap();
        let db = DB::open(dir.path(), text_schema(), Options::default().record_format(format)).unwrap();

        let body = "x".repeat(MAX_VARCHAR_LEN + 1);
        let result = db.set_values(b"too_big", vec![body.into()]);
        assert!(matches!(result, Err(Error::SchemaMismatch(_))));
        assert!(db.is_empty().unwrap());
    }
}

#[test]
fn test_varchar_multibyte_limit_is_in_bytes() {
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), text_schema(), Options::default()).unwrap();

    // 21,845 three-byte characters = 65,535 bytes
    let fits = "€".repeat(MAX_VARCHAR_LEN / 3);
    db.set_values(b"fits", vec![fits.into()]).unwrap();

    let over = format!("{}a", "€".repeat(MAX_VARCHAR_LEN / 3));
    assert!(matches!(db.set_values(b"over", vec![over.into()]), Err(Error::SchemaMismatch(_))));
}

#[test]
fn test_empty_key_and_empty_string() {
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), text_schema(), Options::default()).unwrap();

    db.set_values(b"", vec!["".into()]).unwrap();
    assert_eq!(db.get(b"").unwrap().get(0).and_then(Value::as_str), Some(""));

    db.delete(b"").unwrap();
    assert!(matches!(db.get(b""), Err(Error::KeyNotFound)));
}

#[test]
fn test_key_length_limit() {
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), text_schema(), Options::default()).unwrap();

    let longest = vec![b'k'; MAX_KEY_LEN];
    db.set_values(&longest, vec!["v".into()]).unwrap();
    assert!(db.contains_key(&longest).unwrap());

    let too_long = vec![b'k'; MAX_KEY_LEN + 1];
    assert!(matches!(db.set_values(&too_long, vec!["v".into()]), Err(Error::InvalidArgument(_))));
    assert!(matches!(db.delete(&too_long), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_binary_keys() {
    let dir = TempDir::new().unwrap();
    let db = DB::open(dir.path(), text_schema(), Options::default()).unwrap();

    let keys: Vec<Vec<u8>> = vec![vec![0x00], vec![0xFF, 0x00, 0xFF], (0..=255u8).collect()];
    for (i, key) in keys.iter().enumerate() {
        db.set_values(key, vec![format!("v{}", i).into()]).unwrap();
    }
    for (i, key) in keys.iter().enumerate() {
        let expected = format!("v{}", i);
        assert_eq!(db.get(key).unwrap().get(0).and_then(Value::as_str), Some(expected.as_str()));
    }
}

#[test]
fn test_numeric_extremes() {
    let schema = Schema::new(vec![
        Field::new("i", DataType::Integer),
        Field::new("f", DataType::Float),
        Field::new("b", DataType::Boolean),
    ])
    .unwrap();

    for format in [RecordFormat::Fixed, RecordFormat::SelfDescribing] {
        let dir = TempDir::new().unwrap();
        let db = DB::open(dir.path(), schema.clone(), Options::default().record_format(format)).unwrap();

        let cases = [
            (i64::MIN, f64::MIN, false),
            (i64::MAX, f64::MAX, true),
            (0, -0.0, false),
            (-1, f64::INFINITY, true),
            (1, f64::EPSILON, false),
        ];
        for (n, (i, f, b)) in cases.iter().enumerate() {
            let key = [n as u8];
            db.set_values(&key, vec![(*i).into(), (*f).into(), (*b).into()]).unwrap();
            let row = db.get(&key).unwrap();
            assert_eq!(row.get(0).and_then(Value::as_i64), Some(*i));
            assert_eq!(row.get(1).and_then(Value::as_f64).map(f64::to_bits), Some(f.to_bits()));
            assert_eq!(row.get(2).and_then(Value::as_bool), Some(*b));
        }
    }
}

#[test]
fn test_tiny_scan_blocks() {
    for block_size in [1, 2, 4, 5, 6] {
        let dir = TempDir::new().unwrap();
        let options = Options::default().scan_block_size(block_size);

        {
            let db = DB::open(dir.path(), text_schema(), options.clone()).unwrap();
            db.set_values(b"a", vec!["x".repeat(100).into()]).unwrap();
            db.set_values(b"b", vec!["".into()]).unwrap();
            db.delete(b"a").unwrap();
            db.set_values(b"c", vec!["y".into()]).unwrap();
            db.close().unwrap();
        }

        let db = DB::open(dir.path(), text_schema(), options).unwrap();
        let keys: Vec<Vec<u8>> = db.scan_all().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()], "block size {}", block_size);
    }
}

#[test]
fn test_zero_scan_block_rejected() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().scan_block_size(0);
    assert!(matches!(
        DB::open(dir.path(), text_schema(), options),
        Err(Error::InvalidArgument(_))
    ));
}
