use cinegraph::youtube::extract_video_ids;

fn fixture() -> String {
    std::fs::read_to_string("tests/fixtures/youtube_results.html").unwrap()
}

#[test]
fn extracts_video_ids_in_page_order() {
    let ids = extract_video_ids(&fixture(), 10).unwrap();
    assert_eq!(ids, vec!["0xbBLJ1WGwQ", "2GfZl4kuVNI", "Q7tFzQ8Q9sA"]);
}

#[test]
fn respects_result_limit() {
    let ids = extract_video_ids(&fixture(), 2).unwrap();
    assert_eq!(ids, vec!["0xbBLJ1WGwQ", "2GfZl4kuVNI"]);
}

#[test]
fn page_without_results_data_fails() {
    let err = extract_video_ids("<html><body>No results</body></html>", 2).unwrap_err();
    assert!(err.to_string().contains("ytInitialData"), "{err}");
}
