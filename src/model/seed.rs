//! Sample catalog used by `streamhub seed`, `--in-memory` mode and tests.

use super::{Content, User};
use crate::error::Result;

pub fn sample_users() -> Result<Vec<User>> {
    Ok(vec![
        User::new("Ana", "ana@mail.com", 22, "Colombia")?,
        User::new("Carlos", "carlos@mail.com", 30, "México")?,
    ])
}

pub fn sample_contents() -> Result<Vec<Content>> {
    Ok(vec![
        Content::movie("Inception", &["Science Fiction", "Action"], 148, 2010, 4.8)?,
        Content::series("Dark", &["Drama", "Science Fiction"], 60, 3, 2017, 4.9)?,
        Content::movie("Interstellar", &["Science Fiction", "Drama"], 169, 2014, 4.7)?,
    ])
}
