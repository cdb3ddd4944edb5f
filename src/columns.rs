use serde::{Deserialize, Serialize};

use crate::error::{DatasetErr, Result};

/// How a column is consumed downstream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Input,
    Target,
    #[default]
    Unused,
}

/// Metadata for a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub role: Role,
}

/// Per-column names and roles.
///
/// Names are unique within the registry. Every column starts out as
/// `column_<index>` with role [`Role::Unused`].
#[derive(Debug, Clone, Default)]
pub struct ColumnRegistry {
    columns: Vec<Column>,
}

impl ColumnRegistry {
    /// Creates a registry of `count` columns with default names.
    pub fn new(count: usize) -> Self {
        let columns = (0..count)
            .map(|index| Column {
                name: format!("column_{index}"),
                role: Role::Unused,
            })
            .collect();

        Self { columns }
    }

    /// Creates a registry from explicit names.
    ///
    /// # Errors
    /// `DatasetErr::DuplicateName` if two names are equal.
    pub fn with_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::default();
        for name in names {
            let name = name.into();
            if let Some(index) = registry.index_of(&name) {
                return Err(DatasetErr::DuplicateName { name, index });
            }

            registry.columns.push(Column {
                name,
                role: Role::Unused,
            });
        }

        Ok(registry)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the column at `index`.
    ///
    /// # Errors
    /// `DatasetErr::OutOfRange` if `index >= len()`.
    pub fn get(&self, index: usize) -> Result<&Column> {
        self.columns.get(index).ok_or(DatasetErr::OutOfRange {
            what: "column",
            index,
            len: self.columns.len(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Returns the index of the column called `name`, if any.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Renames the column at `index`.
    ///
    /// Renaming a column to its current name is a no-op.
    ///
    /// # Errors
    /// - `DatasetErr::OutOfRange` if `index >= len()`.
    /// - `DatasetErr::DuplicateName` if another column already has `name`.
    pub fn set_name(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.get(index)?;

        if let Some(other) = self.index_of(&name).filter(|&other| other != index) {
            return Err(DatasetErr::DuplicateName { name, index: other });
        }

        self.columns[index].name = name;
        Ok(())
    }

    /// Sets the role of the column at `index`. Several columns may share a role.
    ///
    /// # Errors
    /// `DatasetErr::OutOfRange` if `index >= len()`.
    pub fn set_role(&mut self, index: usize, role: Role) -> Result<()> {
        self.get(index)?;
        self.columns[index].role = role;
        Ok(())
    }

    /// Indices of the columns with `role`, in column order.
    pub fn columns_with_role(&self, role: Role) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.role == role)
            .map(|(i, _)| i)
            .collect()
    }

    /// Names of the columns with `role`, in column order.
    pub fn names_with_role(&self, role: Role) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.role == role)
            .map(|c| c.name.as_str())
            .collect()
    }
}
