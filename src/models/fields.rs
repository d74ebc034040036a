//! Keyed field assignment for scraped fragments.
//!
//! Mapping blocks produce rows of `key -> value` pairs where the key is a
//! field name such as `Title` or `URLs`. Each fragment type exposes a static
//! table of the keys it accepts so unknown keys can be rejected when a
//! definition is loaded rather than at scrape time.

use super::scraped::{
    ScrapedGallery, ScrapedMovie, ScrapedPerformer, ScrapedScene, ScrapedStudio, ScrapedTag,
};

/// A value extracted for one field of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Single(String),
    Multi(Vec<String>),
}

/// A fragment whose fields can be assigned by mapping key.
pub trait MappedFields: Default {
    /// Keys accepted by [`MappedFields::set_field`].
    fn field_names() -> &'static [&'static str];

    /// Assign `value` to the field named `key`.
    ///
    /// Returns an error message when the key is unknown or the value shape
    /// does not fit the field (a list assigned to a scalar field).
    fn set_field(&mut self, key: &str, value: FieldValue) -> Result<(), String>;

    fn has_field(key: &str) -> bool {
        Self::field_names().contains(&key)
    }
}

fn into_scalar(key: &str, value: FieldValue) -> Result<String, String> {
    match value {
        FieldValue::Single(s) => Ok(s),
        FieldValue::Multi(_) => Err(format!("cannot assign a list to field {}", key)),
    }
}

fn into_list(value: FieldValue) -> Vec<String> {
    match value {
        FieldValue::Single(s) => vec![s],
        FieldValue::Multi(v) => v,
    }
}

macro_rules! mapped_fields {
    (@set $target:expr, opt, $key:expr, $value:expr) => {
        $target = Some(into_scalar($key, $value)?)
    };
    (@set $target:expr, string, $key:expr, $value:expr) => {
        $target = into_scalar($key, $value)?
    };
    (@set $target:expr, list, $key:expr, $value:expr) => {
        $target = into_list($value)
    };
    ($ty:ident { $($name:literal => $field:ident: $kind:ident),* $(,)? }) => {
        impl MappedFields for $ty {
            fn field_names() -> &'static [&'static str] {
                &[$($name),*]
            }

            fn set_field(&mut self, key: &str, value: FieldValue) -> Result<(), String> {
                match key {
                    $($name => { mapped_fields!(@set self.$field, $kind, key, value); })*
                    _ => return Err(format!("field {} does not exist on {}", key, stringify!($ty))),
                }
                Ok(())
            }
        }
    };
}

mapped_fields!(ScrapedTag {
    "Name" => name: string,
    "RemoteSiteID" => remote_site_id: opt,
});

mapped_fields!(ScrapedStudio {
    "Name" => name: string,
    "URL" => url: opt,
    "URLs" => urls: list,
    "Image" => image: opt,
    "Details" => details: opt,
    "Aliases" => aliases: opt,
    "RemoteSiteID" => remote_site_id: opt,
});

mapped_fields!(ScrapedPerformer {
    "Name" => name: opt,
    "Disambiguation" => disambiguation: opt,
    "Gender" => gender: opt,
    "URL" => url: opt,
    "URLs" => urls: list,
    "Twitter" => twitter: opt,
    "Instagram" => instagram: opt,
    "Birthdate" => birthdate: opt,
    "Ethnicity" => ethnicity: opt,
    "Country" => country: opt,
    "EyeColor" => eye_color: opt,
    "Height" => height: opt,
    "Measurements" => measurements: opt,
    "FakeTits" => fake_tits: opt,
    "PenisLength" => penis_length: opt,
    "Circumcised" => circumcised: opt,
    "CareerLength" => career_length: opt,
    "Tattoos" => tattoos: opt,
    "Piercings" => piercings: opt,
    "Aliases" => aliases: opt,
    "Image" => image: opt,
    "Images" => images: list,
    "Details" => details: opt,
    "DeathDate" => death_date: opt,
    "HairColor" => hair_color: opt,
    "Weight" => weight: opt,
    "RemoteSiteID" => remote_site_id: opt,
});

mapped_fields!(ScrapedScene {
    "Title" => title: opt,
    "Code" => code: opt,
    "Details" => details: opt,
    "Director" => director: opt,
    "URL" => url: opt,
    "URLs" => urls: list,
    "Date" => date: opt,
    "Image" => image: opt,
    "RemoteSiteID" => remote_site_id: opt,
});

mapped_fields!(ScrapedGallery {
    "Title" => title: opt,
    "Code" => code: opt,
    "Details" => details: opt,
    "Photographer" => photographer: opt,
    "URL" => url: opt,
    "URLs" => urls: list,
    "Date" => date: opt,
});

mapped_fields!(ScrapedMovie {
    "Name" => name: opt,
    "Aliases" => aliases: opt,
    "Duration" => duration: opt,
    "Date" => date: opt,
    "Rating" => rating: opt,
    "Director" => director: opt,
    "URL" => url: opt,
    "URLs" => urls: list,
    "Synopsis" => synopsis: opt,
    "FrontImage" => front_image: opt,
    "BackImage" => back_image: opt,
    "RemoteSiteID" => remote_site_id: opt,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_scalar_and_list_fields() {
        let mut scene = ScrapedScene::default();
        scene
            .set_field("Title", FieldValue::Single("Hello".to_string()))
            .unwrap();
        scene
            .set_field(
                "URLs",
                FieldValue::Multi(vec!["a".to_string(), "b".to_string()]),
            )
            .unwrap();
        assert_eq!(scene.title.as_deref(), Some("Hello"));
        assert_eq!(scene.urls, vec!["a", "b"]);
    }

    #[test]
    fn test_single_value_into_list_field() {
        let mut performer = ScrapedPerformer::default();
        performer
            .set_field("Images", FieldValue::Single("x.jpg".to_string()))
            .unwrap();
        assert_eq!(performer.images, vec!["x.jpg"]);
    }

    #[test]
    fn test_list_into_scalar_field_is_rejected() {
        let mut movie = ScrapedMovie::default();
        let err = movie
            .set_field("Name", FieldValue::Multi(vec!["a".to_string()]))
            .unwrap_err();
        assert!(err.contains("Name"));
        assert!(movie.name.is_none());
    }

    #[test]
    fn test_unknown_field() {
        let mut tag = ScrapedTag::default();
        assert!(tag
            .set_field("Colour", FieldValue::Single("x".to_string()))
            .is_err());
        assert!(ScrapedTag::has_field("Name"));
        assert!(!ScrapedTag::has_field("name"));
    }
}
