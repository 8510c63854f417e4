//! Streaming result iteration.

use super::fetch::materialize;
use super::Entity;
use crate::error::OrmResult;
use crate::row::{ResultSet, Row};

/// Rows of a query, materialized one at a time into a single reused entity.
///
/// This is a lending iterator: the entity handed out by
/// [`next_entity`](Self::next_entity) is overwritten by the next call, so
/// memory stays flat however many rows the query returned. Clone an item
/// with [`Entity::get_clone`] to keep it.
///
/// ```ignore
/// let mut rows = post.get_iterated(None, None)?;
/// while let Some(p) = rows.next_entity()? {
///     println!("{}", p.value("title"));
/// }
/// ```
#[derive(Debug)]
pub struct EntityIter {
    template: Entity,
    current: Entity,
    rows: Vec<Row>,
    pos: usize,
}

impl EntityIter {
    pub(crate) fn new(template: Entity, result: ResultSet) -> Self {
        Self {
            current: template.get_clone(),
            template,
            rows: result.into_rows(),
            pos: 0,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the row the next call to [`next_entity`](Self::next_entity) returns.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Materialize row `index`, independent of the cursor.
    pub fn get(&mut self, index: usize) -> OrmResult<Option<&mut Entity>> {
        let Some(row) = self.rows.get(index) else {
            return Ok(None);
        };
        self.current.clear();
        materialize(&mut self.current, row, &self.template.instantiations)?;
        Ok(Some(&mut self.current))
    }

    /// Advance to the next row.
    pub fn next_entity(&mut self) -> OrmResult<Option<&mut Entity>> {
        if self.pos >= self.rows.len() {
            return Ok(None);
        }
        let index = self.pos;
        self.pos += 1;
        self.get(index)
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Call `f` for every remaining row.
    pub fn try_for_each<F>(&mut self, mut f: F) -> OrmResult<()>
    where
        F: FnMut(&mut Entity) -> OrmResult<()>,
    {
        while let Some(entity) = self.next_entity()? {
            f(entity)?;
        }
        Ok(())
    }
}
