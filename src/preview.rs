//! Preview data model and assembly
//!
//! A `Preview` is built once per successful scrape from the scraper's fields
//! and the measured candidate images, which are ranked by pixel area.

use serde::{Deserialize, Serialize};

/// Fields produced by a scraper for a single page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PreviewFields {
    pub name: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    /// Canonical link of the page, usually the final URL after redirects
    pub link: String,
    /// Candidate image URLs in document order
    pub images: Vec<String>,
}

/// A candidate image with its resolved pixel dimensions.
///
/// Width and height are both 0 when the dimensions could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImageRef {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl ImageRef {
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
        }
    }

    pub fn unmeasured(url: impl Into<String>) -> Self {
        Self::new(url, 0, 0)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Link preview returned to clients. Field order is the JSON field order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Preview {
    pub name: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub images: Vec<ImageRef>,
    pub url: String,
}

impl Preview {
    /// Combine scraper fields with measured images. The images are ranked
    /// here, so callers pass them in scrape order.
    pub fn assemble(fields: PreviewFields, mut images: Vec<ImageRef>) -> Self {
        rank_images(&mut images);

        Self {
            name: fields.name,
            title: fields.title,
            description: fields.description,
            icon: fields.icon,
            images,
            url: fields.link,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Order images by area, largest first. The sort is stable, so images of
/// equal area keep their scrape order and unmeasured images end up last.
pub fn rank_images(images: &mut [ImageRef]) {
    images.sort_by(|a, b| b.area().cmp(&a.area()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> PreviewFields {
        PreviewFields {
            name: "Example".to_string(),
            title: "Example Domain".to_string(),
            description: "An example".to_string(),
            icon: "https://example.com/favicon.ico".to_string(),
            link: "https://example.com/".to_string(),
            images: vec![],
        }
    }

    #[test]
    fn test_rank_by_area_descending() {
        let mut images = vec![
            ImageRef::new("small.png", 5, 5),
            ImageRef::new("large.png", 100, 50),
            ImageRef::new("medium.png", 10, 10),
        ];
        rank_images(&mut images);

        let order: Vec<_> = images.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(order, vec!["large.png", "medium.png", "small.png"]);
    }

    #[test]
    fn test_rank_is_stable_for_equal_area() {
        let mut images = vec![
            ImageRef::new("wide.png", 20, 5),
            ImageRef::new("big.png", 50, 50),
            ImageRef::new("tall.png", 5, 20),
            ImageRef::new("square.png", 10, 10),
        ];
        rank_images(&mut images);

        let order: Vec<_> = images.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(order, vec!["big.png", "wide.png", "tall.png", "square.png"]);
    }

    #[test]
    fn test_unmeasured_images_sort_last_in_scrape_order() {
        let mut images = vec![
            ImageRef::unmeasured("broken-1.png"),
            ImageRef::new("ok.png", 1, 1),
            ImageRef::unmeasured("broken-2.png"),
            ImageRef::new("zero-width.png", 0, 300),
        ];
        rank_images(&mut images);

        let order: Vec<_> = images.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(order, vec!["ok.png", "broken-1.png", "broken-2.png", "zero-width.png"]);
    }

    #[test]
    fn test_area_does_not_overflow() {
        let image = ImageRef::new("huge.png", u32::MAX, u32::MAX);
        assert_eq!(image.area(), u64::from(u32::MAX) * u64::from(u32::MAX));
    }

    #[test]
    fn test_assemble_maps_fields_and_ranks() {
        let preview = Preview::assemble(
            fields(),
            vec![ImageRef::new("b.png", 5, 5), ImageRef::new("a.png", 10, 10)],
        );

        assert_eq!(preview.title, "Example Domain");
        assert_eq!(preview.url, "https://example.com/");
        assert_eq!(preview.images[0].url, "a.png");
        assert_eq!(preview.images[1].url, "b.png");
    }

    #[test]
    fn test_json_field_order() {
        let preview = Preview::assemble(fields(), vec![ImageRef::new("a.png", 10, 10)]);
        let json = preview.to_json().unwrap();

        assert_eq!(
            json,
            r#"{"name":"Example","title":"Example Domain","description":"An example","icon":"https://example.com/favicon.ico","images":[{"url":"a.png","width":10,"height":10}],"url":"https://example.com/"}"#
        );
    }

    #[test]
    fn test_empty_image_list_serializes_as_array() {
        let preview = Preview::assemble(fields(), vec![]);
        let value: serde_json::Value = serde_json::from_str(&preview.to_json().unwrap()).unwrap();
        assert_eq!(value["images"], serde_json::json!([]));
    }
}
