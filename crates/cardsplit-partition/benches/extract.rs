use cardsplit_partition::{RecordExtractor, derive_key};

/// Synthetic export with `n` records spread over a few countries and months.
fn synthetic_export(n: usize) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root xmlns=\"http://www.peppol.eu/schema/pd/businesscard-generic/201907/\" version=\"2\">\n",
    );
    for i in 0..n {
        let cc = ["BE", "FR", "DE", "NL", "NO"][i % 5];
        xml.push_str(&format!(
            r#"  <businesscard><participant scheme="iso6523-actorid-upis" value="0208:{i:010}"/><entity countrycode="{cc}"><name name="Company {i}"/><geoinfo>Street {i}</geoinfo><regdate>2024-{:02}-01</regdate></entity></businesscard>
"#,
            i % 12 + 1
        ));
    }
    xml.push_str("</root>\n");
    xml
}

/// Load a real export if `BENCH_DATA_DIR` is set, synthetic data otherwise.
fn load_export() -> String {
    match std::env::var("BENCH_DATA_DIR") {
        Ok(dir) => {
            let path = std::path::Path::new(&dir).join("businesscards_sample.xml");
            std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
        }
        Err(_) => synthetic_export(10_000),
    }
}

#[divan::bench]
fn extract_records(bencher: divan::Bencher) {
    let xml = load_export();
    bencher
        .counter(divan::counter::BytesCount::new(xml.len()))
        .bench(|| {
            RecordExtractor::new(xml.as_bytes(), "businesscard")
                .map(|r| r.unwrap())
                .count()
        });
}

#[divan::bench]
fn extract_and_derive_keys(bencher: divan::Bencher) {
    let xml = load_export();
    bencher
        .counter(divan::counter::BytesCount::new(xml.len()))
        .bench(|| {
            RecordExtractor::new(xml.as_bytes(), "businesscard")
                .map(|r| derive_key(&r.unwrap()).is_degraded())
                .filter(|degraded| *degraded)
                .count()
        });
}

fn main() {
    divan::main();
}
