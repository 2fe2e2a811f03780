use pinharvest_engine::{
    decode_html, extract_link, ExtractError, ImageLinkExtractor, LinkExtractor,
};
use pretty_assertions::assert_eq;

const PIN_PAGE: &str = include_str!("fixtures/pin_page.html");

#[test]
fn extracts_the_closeup_image_from_a_pin_page() {
    let link = extract_link(PIN_PAGE).expect("link");
    assert_eq!(link, "https://i.pinimg.com/originals/ab/cd/ef/abcdef0123.jpg");
    assert_eq!(extract_link(PIN_PAGE).unwrap(), link);
}

#[test]
fn missing_container_is_an_error_not_a_default() {
    let html = r#"<html><body><img src="https://i.pinimg.com/x.jpg"></body></html>"#;
    let err = extract_link(html).unwrap_err();
    assert!(matches!(err, ExtractError::MissingContainer(_)));
}

#[test]
fn container_without_image_or_source_is_an_error() {
    let no_img = r#"<div data-test-id="pin-closeup-image"><span>none</span></div>"#;
    assert_eq!(extract_link(no_img).unwrap_err(), ExtractError::MissingImage);

    let blank_src = r#"<div data-test-id="pin-closeup-image"><img src="  "></div>"#;
    assert_eq!(extract_link(blank_src).unwrap_err(), ExtractError::MissingSource);
}

#[test]
fn relative_sources_resolve_against_the_page_url() {
    let html = r#"<div data-test-id="pin-closeup-image"><img src="/media/full.jpg"></div>"#;
    let extractor = ImageLinkExtractor::pin_closeup().unwrap();
    let link = extractor
        .extract(html, Some("https://br.pinterest.com/pin/123/"))
        .unwrap();
    assert_eq!(link, "https://br.pinterest.com/media/full.jpg");
}

#[test]
fn invalid_selector_is_rejected_up_front() {
    let err = ImageLinkExtractor::new("div[").unwrap_err();
    assert!(matches!(err, ExtractError::InvalidSelector { .. }));
}

#[test]
fn latin1_pages_decode_before_extraction() {
    let mut bytes = b"<div data-test-id=\"pin-closeup-image\"><img alt=\"caf".to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b"\" src=\"https://i.pinimg.com/c.jpg\"></div>");

    let page = decode_html(&bytes, Some("text/html; charset=iso-8859-1")).unwrap();
    assert_eq!(page.encoding, "windows-1252");
    assert_eq!(extract_link(&page.html).unwrap(), "https://i.pinimg.com/c.jpg");
}
