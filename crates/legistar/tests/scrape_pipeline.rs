use councilmatic_core::db;
use councilmatic_core::schema::FileDate;
use councilmatic_core::search::{FtsHitSource, ResultSet, SearchMatch};
use legistar::SiteAdapter;
use legistar::source::FixtureSource;
use legistar::summary::{AttachmentDetail, HistoryEntry, LegislationDetail, LegislationSummary};
use pretty_assertions::assert_eq;

fn summary(record_no: &str, id: &str, title: &str) -> LegislationSummary {
    LegislationSummary {
        record_no: record_no.to_string(),
        url: format!("https://council.example.gov/Legislation.aspx?ID={id}&GUID=ABC"),
        file_type: "Bill".to_string(),
        status: "In Committee".to_string(),
        title: title.to_string(),
        intro_date: "03/02/2020".to_string(),
        final_date: String::new(),
        version: "0".to_string(),
    }
}

fn detail(sponsor: &str) -> LegislationDetail {
    LegislationDetail {
        controlling_body: "Committee on Streets".to_string(),
        sponsors: vec![sponsor.to_string()],
        attachments: vec![AttachmentDetail {
            label: "Fiscal impact statement".to_string(),
            url: None,
        }],
    }
}

fn history() -> Vec<HistoryEntry> {
    vec![
        HistoryEntry {
            date: "03/05/2020".to_string(),
            acting_body: "City Council".to_string(),
            result: "Referred".to_string(),
            status: "In Committee".to_string(),
        },
        HistoryEntry {
            date: String::new(), // the site leaves some action dates blank
            acting_body: "Committee on Streets".to_string(),
            result: "Hearing held".to_string(),
            status: "In Committee".to_string(),
        },
    ]
}

#[test]
fn scrape_store_and_search_round_trip() {
    let mut source = FixtureSource::new();
    source.push(
        summary("120001", "12345", "Residential parking permits"),
        detail("Smith, Jane"),
        history(),
    );
    source.push(
        summary("120002", "12346", "Sidewalk repair fund"),
        detail("Jones, Pat"),
        history(),
    );

    let mut adapter = SiteAdapter::new(source);
    let mut conn = db::open_in_memory().unwrap();

    // drain the listing the way the offline scrape loop does
    let mut scraped_keys = Vec::new();
    while let Some((_, next)) = adapter.check_for_new_content("").unwrap() {
        let scraped = adapter.scrape_legis_file("", next).unwrap();
        scraped_keys.push(scraped.file.key.clone());
        db::store_scrape(&mut conn, &scraped).unwrap();
    }
    assert_eq!(scraped_keys, vec!["12345".to_string(), "12346".to_string()]);

    // the stored record carries the normalized fields
    let stored = db::leg_file_detail(&conn, "12345").unwrap().unwrap();
    assert_eq!(stored.file.sponsors, vec!["Jane Smith".to_string()]);
    assert_eq!(stored.file.intro_date, FileDate::On(time::macros::date!(2020 - 03 - 02)));
    assert_eq!(stored.attachments.len(), 1);
    assert_eq!(stored.actions.len(), 2);
    assert_eq!(stored.actions[1].date_taken, FileDate::Empty);

    // search hits reconcile back to the stored record
    let hits = FtsHitSource::new(&conn, "parking");
    let results = ResultSet::new(&conn, hits);
    assert_eq!(results.count().unwrap(), 1);
    match &results.resolve_all().unwrap()[0] {
        SearchMatch::LegFile(f) => assert_eq!(f.file.key, "12345"),
        other => panic!("expected a legislation hit, got {other:?}"),
    }
}
