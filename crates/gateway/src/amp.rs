//! Alternate AMP URLs tried when a page answers 403 or 404.

use url::Url;

/// Candidates in the order they are tried: `<path>/amp`, then `?output=amp`.
pub fn amp_candidates(url: &Url) -> [Url; 2] {
    let mut by_path = url.clone();
    let path = url.path();
    let amp_path = if path.ends_with('/') {
        format!("{path}amp")
    } else {
        format!("{path}/amp")
    };
    by_path.set_path(&amp_path);

    let mut by_query = url.clone();
    by_query.query_pairs_mut().append_pair("output", "amp");

    [by_path, by_query]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("https://news.example/story/1", "https://news.example/story/1/amp")]
    #[case("https://news.example/story/", "https://news.example/story/amp")]
    #[case("https://news.example", "https://news.example/amp")]
    #[case("https://news.example/a?x=1", "https://news.example/a/amp?x=1")]
    fn path_variant(#[case] input: &str, #[case] expected: &str) {
        let [by_path, _] = amp_candidates(&Url::parse(input).unwrap());
        assert_eq!(by_path.as_str(), expected);
    }

    #[rstest]
    #[case("https://news.example/story", "https://news.example/story?output=amp")]
    #[case("https://news.example/a?x=1", "https://news.example/a?x=1&output=amp")]
    fn query_variant(#[case] input: &str, #[case] expected: &str) {
        let [_, by_query] = amp_candidates(&Url::parse(input).unwrap());
        assert_eq!(by_query.as_str(), expected);
    }
}
