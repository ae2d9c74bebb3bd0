use url::form_urlencoded;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub number: usize,
    /// `None` for the current page: it renders as plain text, not a link.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    pub first_url: String,
    pub last_url: String,
    pub next_url: Option<String>,
    pub previous_url: Option<String>,
    pub pages: Vec<PageLink>,
}

/// A window of at most ten page links around the current page, clamped to
/// the valid range, plus first/last/next/previous. Every link carries the
/// non-page query parameters forward.
pub fn page_window(
    path: &str,
    query_params: &[(String, String)],
    current: usize,
    total: usize,
) -> PageWindow {
    let total = total.max(1);
    let current = current.clamp(1, total);

    let carried: Vec<&(String, String)> = query_params
        .iter()
        .filter(|(name, _)| name != "page")
        .collect();
    let url_for = |page: usize| paginated_url(path, page, &carried);

    let start = 1.max((current as i64 - 5).min(total as i64 - 9)) as usize;
    let end = (start + 10).min(total + 1); // exclusive

    let pages = (start..end)
        .map(|number| PageLink {
            number,
            url: (number != current).then(|| url_for(number)),
        })
        .collect();

    PageWindow {
        first_url: url_for(1),
        last_url: url_for(total),
        next_url: (current < total).then(|| url_for(current + 1)),
        previous_url: (current > 1).then(|| url_for(current - 1)),
        pages,
    }
}

fn paginated_url(path: &str, page: usize, params: &[&(String, String)]) -> String {
    let mut url = format!("{path}?page={page}");
    if !params.is_empty() {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(name, value)| (name, value)))
            .finish();
        url.push('&');
        url.push_str(&encoded);
    }
    url
}
