//! Product metadata resolution.
//!
//! Every product (group of releases sharing a slug) carries presentation
//! metadata that the filesystem cannot express: a title, an HTML description
//! with attribution, a display order, and whether its latest release is
//! mirrored into the local cache.
//!
//! The table is fixed at compile time. A slug missing from it still produces a
//! product, with placeholder metadata that sorts it after every known one.

/// Title used for slugs missing from the table.
pub const UNKNOWN_TITLE: &str = "???";

/// Display order used for slugs missing from the table.
pub const UNKNOWN_ORDER: u32 = 10_000;

/// Resolved metadata for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub title: String,
    /// Trusted HTML, paragraphs joined with `<br>`.
    pub description: String,
    pub order: u32,
    pub cache_locally: bool,
}

struct Product {
    slug: &'static str,
    title: &'static str,
    description: &'static [&'static str],
    order: u32,
    cache_locally: bool,
}

const PRODUCTS: &[Product] = &[
    Product {
        slug: "osm",
        title: "OpenStreetMap as vector tiles",
        description: &[
            r#"The full <a href="https://www.openstreetmap.org/">OpenStreetMap</a> planet as vector tilesets with zoom levels 0-14 in <a href="https://shortbread-tiles.org/schema/">Shortbread Schema</a>."#,
            r#"Map Data © <a href="https://www.openstreetmap.org/copyright">OpenStreetMap Contributors</a> available under <a href="https://opendatacommons.org/licenses/odbl/">ODbL</a>"#,
        ],
        order: 0,
        cache_locally: true,
    },
    Product {
        slug: "hillshade-vectors",
        title: "Hillshading as vector tiles",
        description: &[
            r#"Hillshade vector tiles based on <a href="https://github.com/tilezen/joerd">Mapzen Jörð Terrain Tiles</a>."#,
            r#"Map Data © <a href="https://github.com/tilezen/joerd/blob/master/docs/attribution.md">Mapzen Terrain Tiles, DEM Sources</a>"#,
        ],
        order: 10,
        cache_locally: false,
    },
    Product {
        slug: "landcover-vectors",
        title: "Landcover as vector tiles",
        description: &[
            r#"Landcover vector tiles based on <a href="https://esa-worldcover.org/en/data-access">ESA Worldcover 2021</a>."#,
            r#"Map Data © <a href="https://esa-worldcover.org/en/data-access">ESA WorldCover project 2021</a> / Contains modified Copernicus Sentinel data (2021) processed by ESA WorldCover consortium, available under <a href="http://creativecommons.org/licenses/by/4.0/"> CC-BY 4.0 International</a>"#,
        ],
        order: 20,
        cache_locally: false,
    },
    Product {
        slug: "bathymetry-vectors",
        title: "Bathymetry as vector tiles",
        description: &[
            r#"Bathymetry Vectors, derived from the <a href="https://www.gebco.net/data_and_products/historical_data_sets/#gebco_2021">GEBCO 2021 Grid</a>, made with <a href="https://www.naturalearthdata.com/">NaturalEarth</a> by <a href="https://opendem.info">OpenDEM</a>"#,
        ],
        order: 30,
        cache_locally: false,
    },
];

/// Look up a slug in the product table.
pub fn lookup(slug: &str) -> Option<ProductInfo> {
    PRODUCTS.iter().find(|p| p.slug == slug).map(|p| ProductInfo {
        title: p.title.to_string(),
        description: p.description.join("<br>"),
        order: p.order,
        cache_locally: p.cache_locally,
    })
}

/// Look up a slug, falling back to placeholder metadata.
///
/// Unknown slugs are not an error: the product is still published, just
/// without a real title, and a warning is logged so the table can be extended.
pub fn resolve(slug: &str) -> ProductInfo {
    lookup(slug).unwrap_or_else(|| {
        tracing::warn!(slug, "unknown group, using placeholder metadata");
        ProductInfo {
            title: UNKNOWN_TITLE.to_string(),
            description: String::new(),
            order: UNKNOWN_ORDER,
            cache_locally: false,
        }
    })
}
