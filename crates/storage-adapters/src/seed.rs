//! Default category hierarchy for fresh installations.

use domains::{Category, CategoryId};

pub type SeedNode = (&'static str, &'static [(&'static str, &'static [&'static str])]);

/// main → sub → sub-sub names.
pub const DEFAULT_TREE: &[SeedNode] = &[
    (
        "Electronics",
        &[
            ("Phones", &["Smartphones", "Feature Phones", "Accessories"]),
            ("Computers", &["Laptops", "Desktops", "Components"]),
            ("Audio", &["Headphones", "Speakers"]),
        ],
    ),
    (
        "Vehicles",
        &[
            ("Cars", &["Sedans", "SUVs", "Vans"]),
            ("Motorcycles", &["Scooters", "Sport Bikes"]),
            ("Parts", &["Tyres", "Engine Parts"]),
        ],
    ),
    (
        "Home and Garden",
        &[
            ("Furniture", &["Sofas", "Tables", "Beds"]),
            ("Garden", &["Tools", "Plants"]),
        ],
    ),
    (
        "Fashion",
        &[
            ("Clothing", &["Women", "Men", "Kids"]),
            ("Shoes", &["Sneakers", "Boots"]),
        ],
    ),
];

/// [`DEFAULT_TREE`] as rows with sequential ids, parents before children.
pub fn default_categories() -> Vec<Category> {
    let mut rows = Vec::new();
    let mut next: CategoryId = 1;
    let mut push = |rows: &mut Vec<Category>, name: &str, parent_id: Option<CategoryId>| {
        let id = next;
        next += 1;
        rows.push(Category {
            id,
            name: name.to_string(),
            description: None,
            parent_id,
        });
        id
    };

    for (main, subs) in DEFAULT_TREE {
        let main_id = push(&mut rows, main, None);
        for (sub, leaves) in subs.iter() {
            let sub_id = push(&mut rows, sub, Some(main_id));
            for leaf in leaves.iter() {
                push(&mut rows, leaf, Some(sub_id));
            }
        }
    }
    rows
}
