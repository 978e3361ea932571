use anyhow::Result;
use ironshard::{Element, ParseError, Partitioner, RecordReader, convert};
use serde_json::json;

fn reader<'a>(xml: &'a str, tag: &str) -> RecordReader<&'a [u8]> {
    RecordReader::new(xml.as_bytes(), tag)
}

fn collect(xml: &str, tag: &str) -> Result<Vec<Element>> {
    reader(xml, tag).collect()
}

fn parse_error(err: &anyhow::Error) -> Option<&ParseError> {
    err.chain().find_map(|c| c.downcast_ref::<ParseError>())
}

#[test]
fn yields_records_in_document_order() -> Result<()> {
    let xml = r#"<root><item id="1">hello</item><item id="2"><val>5</val><val>6</val></item></root>"#;
    let records = collect(xml, "item")?;
    assert_eq!(records.len(), 2);
    assert_eq!(convert(&records[0]).to_value(), json!({"id": "1", "_text": "hello"}));
    assert_eq!(convert(&records[1]).to_value(), json!({"id": "2", "val": ["5", "6"]}));
    Ok(())
}

#[test]
fn records_at_any_depth_and_other_elements_ignored() -> Result<()> {
    let xml = r#"<?xml version="1.0"?>
        <!-- catalog -->
        <root>
          <meta><item id="a"/></meta>
          <section><group><item id="b"><x>1</x></item></group></section>
          <other>noise</other>
          <item id="c"></item>
        </root>"#;
    let ids: Vec<String> = collect(xml, "item")?
        .iter()
        .map(|e| e.attr("id").unwrap_or_default().to_string())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    Ok(())
}

#[test]
fn no_matching_records_is_empty_not_an_error() -> Result<()> {
    assert!(collect("<root><a/><b>t</b></root>", "item")?.is_empty());
    Ok(())
}

#[test]
fn self_closing_record_is_bare() -> Result<()> {
    let records = collect("<root><item/><item></item></root>", "item")?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(Element::is_bare));
    assert_eq!(convert(&records[0]).to_value(), json!({}));
    Ok(())
}

#[test]
fn nested_record_tags_are_each_a_record() -> Result<()> {
    let xml = r#"<root><item id="outer"><item id="inner">x</item><v>1</v></item><item id="next"/></root>"#;
    let mut r = reader(xml, "item");

    let inner = r.next_record()?.expect("inner");
    assert_eq!(convert(&inner).to_value(), json!({"id": "inner", "_text": "x"}));

    let outer = r.next_record()?.expect("outer");
    assert_eq!(
        convert(&outer).to_value(),
        json!({"id": "outer", "item": {}, "v": "1"})
    );

    let next = r.next_record()?.expect("next");
    assert_eq!(next.attr("id"), Some("next"));
    assert!(r.next_record()?.is_none());
    assert_eq!(r.records_seen(), 3);
    Ok(())
}

#[test]
fn every_nested_occurrence_is_counted_once() -> Result<()> {
    let xml = r#"<root>
        <Message id="1"><Message id="2">x</Message></Message>
        <Message id="3"><a><Message id="4"><Message id="5"/></Message></a><Message id="6"/></Message>
    </root>"#;
    let mut ids: Vec<String> = collect(xml, "Message")?
        .iter()
        .map(|e| e.attr("id").unwrap_or_default().to_string())
        .collect();
    assert_eq!(ids, vec!["2", "1", "5", "4", "6", "3"]);

    ids.clear();
    let partitioner = Partitioner::new(4)?;
    for assignment in partitioner.assignments() {
        for record in reader(xml, "Message").with_assignment(assignment) {
            ids.push(record?.attr("id").unwrap_or_default().to_string());
        }
    }
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5", "6"]);
    Ok(())
}

#[test]
fn entities_and_cdata_resolve_in_text_and_attributes() -> Result<()> {
    let xml = r#"<root><item note="a &amp; b &#x41;">Tom &amp; Jerry &lt;3 <![CDATA[<raw> & stuff]]></item></root>"#;
    let records = collect(xml, "item")?;
    let item = &records[0];
    assert_eq!(item.attr("note"), Some("a & b A"));
    assert_eq!(item.text.as_deref(), Some("Tom & Jerry <3 <raw> & stuff"));
    Ok(())
}

#[test]
fn text_after_first_child_is_ignored() -> Result<()> {
    let records = collect("<root><item> lead <b>bold</b> tail </item></root>", "item")?;
    let item = &records[0];
    assert_eq!(item.text.as_deref(), Some("lead"));
    assert_eq!(item.children[0].text.as_deref(), Some("bold"));
    assert_eq!(
        convert(item).to_value(),
        json!({"b": "bold", "_text": "lead"})
    );
    Ok(())
}

#[test]
fn whitespace_only_text_is_absent() -> Result<()> {
    let records = collect("<root><item>\n   \n</item></root>", "item")?;
    assert_eq!(records[0].text, None);
    Ok(())
}

#[test]
fn unterminated_document_is_a_parse_error() {
    let xml = "<root><item id=\"1\">ok</item><item id=\"2\"><val>5</val>";
    let mut r = reader(xml, "item");
    let first = r.next_record().expect("first record parses");
    assert!(first.is_some());

    let err = r.next_record().expect_err("truncated input");
    assert!(parse_error(&err).is_some(), "unexpected error: {err:#}");

    // exhausted after the error
    assert!(r.next_record().expect("done").is_none());
}

#[test]
fn mismatched_close_tag_is_a_parse_error() {
    let results: Vec<Result<Element>> = reader("<root><item><a></b></item></root>", "item").collect();
    assert_eq!(results.len(), 1);
    let err = results.into_iter().next().unwrap().expect_err("mismatch");
    let parse = parse_error(&err).expect("parse error");
    assert!(parse.offset > 0);
}

#[test]
fn unknown_entity_is_a_parse_error() {
    let err = collect("<root><item>&bogus;</item></root>", "item").expect_err("unknown entity");
    let parse = parse_error(&err).expect("parse error");
    assert!(parse.message.contains("bogus"), "{}", parse.message);
}

#[test]
fn records_before_an_error_stay_valid() {
    let xml = "<root><item>1</item><item>2</item><item>3</oops></root>";
    let mut ok = Vec::new();
    let mut failed = false;
    for r in reader(xml, "item") {
        match r {
            Ok(e) => ok.push(e.text.unwrap_or_default()),
            Err(_) => failed = true,
        }
    }
    assert_eq!(ok, vec!["1", "2"]);
    assert!(failed);
}

#[test]
fn assignment_builds_only_owned_records() -> Result<()> {
    let xml: String = std::iter::once("<root>".to_string())
        .chain((0..10).map(|i| format!(r#"<item id="{i}"><v>{i}</v></item>"#)))
        .chain(std::iter::once("</root>".to_string()))
        .collect();
    let partitioner = Partitioner::new(3)?;

    let mut all = Vec::new();
    for assignment in partitioner.assignments() {
        let mut r = reader(&xml, "item").with_assignment(assignment);
        let mut mine = Vec::new();
        while let Some(e) = r.next_record()? {
            mine.push(e.attr("id").unwrap_or_default().parse::<u64>()?);
        }
        assert!(mine.iter().all(|&i| assignment.owns(i)));
        assert_eq!(r.records_seen(), 10);
        assert_eq!(r.records_skipped(), 10 - mine.len() as u64);
        all.extend(mine);
    }
    all.sort_unstable();
    assert_eq!(all, (0..10).collect::<Vec<u64>>());
    Ok(())
}

#[test]
fn unowned_outer_record_still_yields_owned_inner_records() -> Result<()> {
    // start-tag ordinals: 0, n=1, m=2, 1=3, 2=4
    let xml = r#"<root><item id="0"><item id="n"/><item id="m">x</item></item><item id="1"/><item id="2"><a/></item></root>"#;
    let partitioner = Partitioner::new(2)?;
    let ids = |worker: usize| -> Result<Vec<String>> {
        reader(xml, "item")
            .with_assignment(partitioner.assignment(worker)?)
            .map(|r| r.map(|e| e.attr("id").unwrap_or_default().to_string()))
            .collect()
    };
    assert_eq!(ids(0)?, vec!["m", "0", "2"]);
    assert_eq!(ids(1)?, vec!["n", "1"]);

    let outer = reader(xml, "item")
        .with_assignment(partitioner.assignment(0)?)
        .nth(1)
        .expect("outer")?;
    assert_eq!(convert(&outer).to_value(), json!({"id": "0", "item": [{}, {}]}));
    Ok(())
}

#[test]
fn byte_offset_advances() -> Result<()> {
    let xml = "<root><item>1</item><item>2</item></root>";
    let mut r = reader(xml, "item");
    assert_eq!(r.byte_offset(), 0);
    r.next_record()?;
    let after_first = r.byte_offset();
    assert!(after_first > 0);
    r.next_record()?;
    assert!(r.byte_offset() > after_first);
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn reads_gzip_compressed_input() -> Result<()> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("catalog.xml.gz");
    let mut enc = GzEncoder::new(std::fs::File::create(&path)?, Compression::default());
    enc.write_all(br#"<root><item id="1">a</item><item id="2">b</item></root>"#)?;
    enc.finish()?;

    let input = ironshard::open_input(&path)?;
    let records: Vec<Element> = RecordReader::new(input, "item").collect::<Result<_>>()?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].text.as_deref(), Some("b"));
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn detects_gzip_by_magic_without_extension() -> Result<()> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("catalog.data");
    let mut enc = GzEncoder::new(std::fs::File::create(&path)?, Compression::default());
    enc.write_all(b"<root><item>z</item></root>")?;
    enc.finish()?;

    let input = ironshard::open_input(&path)?;
    let records: Vec<Element> = RecordReader::new(input, "item").collect::<Result<_>>()?;
    assert_eq!(records[0].text.as_deref(), Some("z"));
    Ok(())
}
