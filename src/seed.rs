//! Lexicon seeding: the administrative bootstrap of niches and keywords.
//!
//! Every seeded keyword starts at the default weight 1.0; feedback is the
//! only thing that moves weights afterwards.

use anyhow::Result;

use crate::config::Config;
use crate::db;

const NICHES: &[(&str, &str, &[&str])] = &[
    (
        "Fitness & Wellness",
        "Yoga, gym, workout gear, supplements, health.",
        &[
            "yoga", "gym", "dumbbell", "mat", "protein", "workout", "sport", "run", "fitness",
            "exercise",
        ],
    ),
    (
        "Pet Supplies",
        "Toys, food, accessories for dogs, cats, and other pets.",
        &[
            "dog", "cat", "pet", "toy", "food", "leash", "collar", "animal", "puppy", "kitten",
        ],
    ),
    (
        "Home Office",
        "Desks, chairs, computers, productivity tools.",
        &[
            "desk", "chair", "computer", "laptop", "monitor", "keyboard", "mouse", "office", "work",
        ],
    ),
    (
        "Beauty & Personal Care",
        "Makeup, skincare, grooming, bath products.",
        &[
            "makeup", "lipstick", "cream", "skin", "hair", "brush", "perfume", "soap", "lotion",
        ],
    ),
    (
        "Tech Accessories",
        "Phone cases, chargers, cables, gadgets.",
        &[
            "phone", "case", "charger", "cable", "usb", "headphone", "earbud", "battery", "screen",
        ],
    ),
    (
        "Outdoor & Adventure",
        "Camping gear, hiking equipment, travel essentials.",
        &[
            "tent", "backpack", "hike", "camp", "sleeping", "boot", "compass", "map", "nature",
        ],
    ),
    (
        "Kitchen & Dining",
        "Cookware, utensils, appliances, tableware.",
        &[
            "pan", "pot", "knife", "spoon", "fork", "plate", "bowl", "cup", "mug", "chef",
        ],
    ),
    (
        "Fashion & Apparel",
        "Clothing, shoes, accessories, style.",
        &[
            "shirt", "pants", "dress", "shoe", "hat", "jacket", "jeans", "clothing", "wear",
        ],
    ),
    (
        "Gaming",
        "Consoles, controllers, headsets, video games.",
        &[
            "game", "console", "controller", "joystick", "headset", "xbox", "playstation",
            "nintendo",
        ],
    ),
    (
        "Home Decor",
        "Furniture, lighting, rugs, decoration.",
        &[
            "sofa", "lamp", "rug", "vase", "pillow", "curtain", "mirror", "furniture", "room",
        ],
    ),
    (
        "Baby & Kids",
        "Toys, diapers, strollers, baby care.",
        &[
            "baby", "diaper", "toy", "stroller", "crib", "bottle", "pacifier", "kid", "child",
        ],
    ),
    (
        "Automotive",
        "Car accessories, tools, maintenance.",
        &["car", "tire", "wheel", "oil", "tool", "vehicle", "auto", "drive"],
    ),
    (
        "Gardening",
        "Plants, tools, seeds, outdoor living.",
        &[
            "plant", "flower", "garden", "shovel", "pot", "soil", "seed", "grow", "green",
        ],
    ),
    (
        "Books & Media",
        "Books, vinyl, movies, music.",
        &[
            "book", "novel", "read", "vinyl", "record", "music", "movie", "cd", "paper",
        ],
    ),
    (
        "Art & Crafts",
        "Paint, brushes, yarn, DIY supplies.",
        &[
            "paint", "brush", "canvas", "draw", "pencil", "yarn", "knit", "craft", "art",
        ],
    ),
];

/// Resets the lexicon to the seeded niche/keyword set.
///
/// History and products reference niches, so the whole domain state is
/// wiped first. This is a from-scratch bootstrap, not an upgrade path.
pub async fn run_seed(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM history").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM products").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM keywords").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM niches").execute(&mut *tx).await?;

    let mut keyword_count = 0usize;
    for (name, description, keywords) in NICHES {
        let niche_id = sqlx::query("INSERT INTO niches (name, description) VALUES (?, ?)")
            .bind(name)
            .bind(description)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for keyword in keywords.iter() {
            sqlx::query("INSERT INTO keywords (niche_id, keyword) VALUES (?, ?)")
                .bind(niche_id)
                .bind(keyword)
                .execute(&mut *tx)
                .await?;
            keyword_count += 1;
        }
    }

    tx.commit().await?;
    pool.close().await;

    println!(
        "Seeded {} niches with {} keywords.",
        NICHES.len(),
        keyword_count
    );
    Ok(())
}
