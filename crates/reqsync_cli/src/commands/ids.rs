//! Id commands.

use reqsync_core::{type_of as kind_of, EntityKind, TypedId};

/// Mints `count` fresh ids for the entity tag `tag`.
pub fn mint_ids(tag: &str, count: usize) -> Result<Vec<TypedId>, Box<dyn std::error::Error>> {
    let kind = EntityKind::from_tag(tag).ok_or_else(|| {
        let known: Vec<&str> = EntityKind::ALL.iter().map(|k| k.tag()).collect();
        format!("unknown entity tag {tag:?}, expected one of {}", known.join(", "))
    })?;
    Ok((0..count).map(|_| TypedId::mint(kind)).collect())
}

/// Runs the mint command.
pub fn mint(tag: &str, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    for id in mint_ids(tag, count)? {
        println!("{id}");
    }
    Ok(())
}

/// Describes the entity type of a raw id.
pub fn describe(raw: &str) -> Result<String, Box<dyn std::error::Error>> {
    let kind = kind_of(raw)?;
    Ok(format!("{kind} ({})", kind.tag()))
}

/// Runs the type-of command.
pub fn type_of(raw: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", describe(raw)?);
    Ok(())
}
