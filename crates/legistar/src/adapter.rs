use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::{info, warn};
use url::Url;

use councilmatic_core::schema::{Action, Attachment, FileDate, LegFile, ScrapedFile};

use crate::error::ScrapeError;
use crate::source::LegislationSource;
use crate::summary::LegislationSummary;

const US_DATE: &[BorrowedFormatItem<'static>] = format_description!("[month]/[day]/[year]");

/// Adapts the hosted legislation site to the application's record shapes.
/// The source owns listing pagination and retrieval; this layer owns field
/// renaming, key derivation, and name/date normalization.
pub struct SiteAdapter<S: LegislationSource> {
    source: S,
}

impl<S: LegislationSource> SiteAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Expand one summary into a full record with its attachments and
    /// actions. The caller's key is bookkeeping only; the canonical key is
    /// re-derived from the record URL.
    ///
    /// A transient fetch failure during expansion skips to the next summary
    /// in the listing and retries once; a second failure propagates.
    pub fn scrape_legis_file(
        &mut self,
        _key: &str,
        mut summary: LegislationSummary,
    ) -> Result<ScrapedFile, ScrapeError> {
        let (attrs, history) = match self.source.expand(&summary) {
            Ok(expanded) => expanded,
            Err(ScrapeError::TransientFetch(reason)) => {
                warn!(%reason, "transient failure expanding summary, skipping to next record");
                match self.source.next_summary()? {
                    Some(next) => {
                        summary = next;
                        self.source.expand(&summary)?
                    }
                    None => return Err(ScrapeError::TransientFetch(reason)),
                }
            }
            Err(other) => return Err(other),
        };

        let key = key_from_url(&summary.url).ok_or(ScrapeError::MalformedSummary("ID"))?;

        let sponsors: Vec<String> = attrs.sponsors.iter().map(|s| reorder_name(s)).collect();

        let file = LegFile {
            key: key.clone(),
            id: summary.record_no,
            url: summary.url,
            file_type: summary.file_type,
            status: summary.status,
            title: summary.title,
            controlling_body: attrs.controlling_body,
            intro_date: convert_date(&summary.intro_date)?,
            final_date: convert_date(&summary.final_date)?,
            version: summary.version,
            sponsors,
            minutes_url: None,
        };

        let attachments = attrs
            .attachments
            .into_iter()
            .map(|a| Attachment {
                key: key.clone(),
                file: a.label,
                url: a.url,
            })
            .collect();

        let actions = history
            .into_iter()
            .map(|entry| {
                Ok(Action {
                    key: key.clone(),
                    date_taken: convert_date(&entry.date)?,
                    acting_body: entry.acting_body,
                    motion: entry.result,
                    description: entry.status,
                })
            })
            .collect::<Result<Vec<_>, ScrapeError>>()?;

        info!(%key, "scraped legislation record");

        Ok(ScrapedFile {
            file,
            attachments,
            actions,
            // the hosted site publishes no minutes
            minutes: Vec::new(),
        })
    }

    /// Advance the listing by one summary, returning the `(cursor, summary)`
    /// pair callers poll on, or `None` at end of listing. The `last_key`
    /// checkpoint is ignored: every adapter instance rescans the listing
    /// from the beginning, so previously seen records are visited again.
    pub fn check_for_new_content(
        &mut self,
        _last_key: &str,
    ) -> Result<Option<(u64, LegislationSummary)>, ScrapeError> {
        Ok(self.source.next_summary()?.map(|summary| (0, summary)))
    }
}

/// The record key is the `ID` query parameter of the record URL.
pub fn key_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    url.query_pairs()
        .find(|(name, _)| name == "ID")
        .map(|(_, value)| value.into_owned())
}

/// Reorder "Last, First" to "First Last"; names without a comma pass
/// through unchanged.
pub fn reorder_name(sponsor: &str) -> String {
    match sponsor.split_once(',') {
        Some((last, first)) => format!("{} {}", first.trim(), last.trim()),
        None => sponsor.to_string(),
    }
}

/// `MM/DD/YYYY` to a date; the empty string stays the empty value rather
/// than becoming an error or a null.
pub fn convert_date(orig: &str) -> Result<FileDate, ScrapeError> {
    if orig.is_empty() {
        return Ok(FileDate::Empty);
    }
    Date::parse(orig, US_DATE)
        .map(FileDate::On)
        .map_err(|source| ScrapeError::InvalidDate {
            value: orig.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FixtureSource;
    use crate::summary::{AttachmentDetail, HistoryEntry, LegislationDetail};
    use pretty_assertions::assert_eq;
    use time::macros::date;

    fn summary(record_no: &str, id: &str) -> LegislationSummary {
        LegislationSummary {
            record_no: record_no.to_string(),
            url: format!("https://council.example.gov/Legislation.aspx?ID={id}&GUID=ABC-123"),
            file_type: "Bill".to_string(),
            status: "In Committee".to_string(),
            title: "An ordinance amending Title 9".to_string(),
            intro_date: "01/15/2020".to_string(),
            final_date: String::new(),
            version: "0".to_string(),
        }
    }

    fn detail() -> LegislationDetail {
        LegislationDetail {
            controlling_body: "Committee on Finance".to_string(),
            sponsors: vec!["Smith, Jane".to_string(), "Pat Jones".to_string()],
            attachments: vec![AttachmentDetail {
                label: "Exhibit A".to_string(),
                url: Some("https://council.example.gov/att/1.pdf".to_string()),
            }],
        }
    }

    fn history() -> Vec<HistoryEntry> {
        vec![HistoryEntry {
            date: "02/01/2020".to_string(),
            acting_body: "City Council".to_string(),
            result: "Referred".to_string(),
            status: "In Committee".to_string(),
        }]
    }

    /// A source whose expansions fail transiently for marked records.
    struct FlakySource {
        inner: FixtureSource,
        failing: Vec<String>,
    }

    impl LegislationSource for FlakySource {
        fn next_summary(&mut self) -> Result<Option<LegislationSummary>, ScrapeError> {
            self.inner.next_summary()
        }

        fn expand(
            &mut self,
            summary: &LegislationSummary,
        ) -> Result<(LegislationDetail, Vec<HistoryEntry>), ScrapeError> {
            if self.failing.contains(&summary.record_no) {
                return Err(ScrapeError::TransientFetch("connection reset".to_string()));
            }
            self.inner.expand(summary)
        }
    }

    #[test]
    fn reorders_comma_names_only() {
        assert_eq!(reorder_name("Smith, Jane"), "Jane Smith");
        assert_eq!(reorder_name("Jane Smith"), "Jane Smith");
        assert_eq!(reorder_name("O'Neill,Pat"), "Pat O'Neill");
    }

    #[test]
    fn converts_dates_and_keeps_the_empty_sentinel() {
        assert_eq!(
            convert_date("01/15/2020").unwrap(),
            FileDate::On(date!(2020 - 01 - 15))
        );
        assert_eq!(convert_date("").unwrap(), FileDate::Empty);
        assert!(matches!(
            convert_date("2020-01-15"),
            Err(ScrapeError::InvalidDate { .. })
        ));
    }

    #[test]
    fn key_comes_from_the_url_id_parameter() {
        assert_eq!(
            key_from_url("https://council.example.gov/Legislation.aspx?ID=12345&GUID=X"),
            Some("12345".to_string())
        );
        assert_eq!(key_from_url("https://council.example.gov/Legislation.aspx"), None);
    }

    #[test]
    fn scrape_maps_every_field() {
        let mut source = FixtureSource::new();
        source.push(summary("120001", "12345"), detail(), history());
        let mut adapter = SiteAdapter::new(source);

        let first = adapter.check_for_new_content("").unwrap().unwrap();
        assert_eq!(first.0, 0);
        // the caller-supplied key is overridden by the URL's ID parameter
        let scraped = adapter.scrape_legis_file("999", first.1).unwrap();

        assert_eq!(scraped.file.key, "12345");
        assert_eq!(scraped.file.id, "120001");
        assert_eq!(scraped.file.controlling_body, "Committee on Finance");
        assert_eq!(scraped.file.intro_date, FileDate::On(date!(2020 - 01 - 15)));
        assert_eq!(scraped.file.final_date, FileDate::Empty);
        assert_eq!(
            scraped.file.sponsors,
            vec!["Jane Smith".to_string(), "Pat Jones".to_string()]
        );
        assert_eq!(scraped.file.minutes_url, None);

        assert_eq!(scraped.attachments.len(), 1);
        assert_eq!(scraped.attachments[0].key, "12345");
        assert_eq!(scraped.attachments[0].file, "Exhibit A");

        assert_eq!(scraped.actions.len(), 1);
        assert_eq!(scraped.actions[0].key, "12345");
        assert_eq!(scraped.actions[0].motion, "Referred");
        assert_eq!(scraped.actions[0].description, "In Committee");

        assert!(scraped.minutes.is_empty());
    }

    #[test]
    fn transient_failure_skips_to_the_next_summary_once() {
        let mut inner = FixtureSource::new();
        inner.push(summary("A", "1"), detail(), history());
        inner.push(summary("B", "2"), detail(), history());
        let mut adapter = SiteAdapter::new(FlakySource {
            inner,
            failing: vec!["A".to_string()],
        });

        let (_, first) = adapter.check_for_new_content("").unwrap().unwrap();
        let scraped = adapter.scrape_legis_file("", first).unwrap();
        // the record comes from the replacement summary
        assert_eq!(scraped.file.key, "2");
    }

    #[test]
    fn second_transient_failure_propagates() {
        let mut inner = FixtureSource::new();
        inner.push(summary("A", "1"), detail(), history());
        inner.push(summary("B", "2"), detail(), history());
        let mut adapter = SiteAdapter::new(FlakySource {
            inner,
            failing: vec!["A".to_string(), "B".to_string()],
        });

        let (_, first) = adapter.check_for_new_content("").unwrap().unwrap();
        assert!(matches!(
            adapter.scrape_legis_file("", first),
            Err(ScrapeError::TransientFetch(_))
        ));
    }

    #[test]
    fn transient_failure_at_end_of_listing_propagates() {
        let mut inner = FixtureSource::new();
        inner.push(summary("A", "1"), detail(), history());
        let mut adapter = SiteAdapter::new(FlakySource {
            inner,
            failing: vec!["A".to_string()],
        });

        let (_, only) = adapter.check_for_new_content("").unwrap().unwrap();
        assert!(matches!(
            adapter.scrape_legis_file("", only),
            Err(ScrapeError::TransientFetch(_))
        ));
    }

    #[test]
    fn check_for_new_content_ignores_the_checkpoint_and_ends_cleanly() {
        let mut source = FixtureSource::new();
        source.push(summary("A", "1"), detail(), history());
        source.push(summary("B", "2"), detail(), history());
        let mut adapter = SiteAdapter::new(source);

        let (_, a) = adapter.check_for_new_content("some-checkpoint").unwrap().unwrap();
        assert_eq!(a.record_no, "A");
        let (_, b) = adapter.check_for_new_content("some-checkpoint").unwrap().unwrap();
        assert_eq!(b.record_no, "B");
        assert!(adapter.check_for_new_content("some-checkpoint").unwrap().is_none());
    }

    #[test]
    fn summary_without_an_id_parameter_is_malformed() {
        let mut source = FixtureSource::new();
        let mut bad = summary("A", "1");
        bad.url = "https://council.example.gov/Legislation.aspx?GUID=only".to_string();
        source.push(bad.clone(), detail(), history());
        let mut adapter = SiteAdapter::new(source);

        assert!(matches!(
            adapter.scrape_legis_file("", bad),
            Err(ScrapeError::MalformedSummary("ID"))
        ));
    }
}
