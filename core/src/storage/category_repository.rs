use crate::models::{Category, datetime_to_timestamp, timestamp_to_datetime};
use crate::Result;
use rusqlite::{Connection, OptionalExtension, params};

pub struct CategoryRepository;

impl CategoryRepository {
    /// Create a new category
    pub fn create(conn: &Connection, category: &Category) -> Result<()> {
        conn.execute(
            "INSERT INTO categories (id, name, icon, color, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                category.id,
                category.name,
                category.icon,
                category.color,
                datetime_to_timestamp(&category.created_at),
            ],
        )?;
        Ok(())
    }

    /// Find a category by its unique name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Category>> {
        let category = conn
            .query_row(
                "SELECT id, name, icon, color, created_at FROM categories WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        icon: row.get(2)?,
                        color: row.get(3)?,
                        created_at: timestamp_to_datetime(row.get(4)?),
                    })
                },
            )
            .optional()?;

        Ok(category)
    }

    /// Get all categories ordered by name
    pub fn get_all(conn: &Connection) -> Result<Vec<Category>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, icon, color, created_at FROM categories ORDER BY name"
        )?;

        let categories = stmt.query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                icon: row.get(2)?,
                color: row.get(3)?,
                created_at: timestamp_to_datetime(row.get(4)?),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_categories_ordered_by_name() {
        let conn = Database::open_in_memory().unwrap();
        CategoryRepository::create(&conn, &Category::new("Wisdom".to_string())).unwrap();
        CategoryRepository::create(&conn, &Category::new("Love".to_string())).unwrap();
        CategoryRepository::create(&conn, &Category::new("Motivation".to_string())).unwrap();

        let names: Vec<_> = CategoryRepository::get_all(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Love", "Motivation", "Wisdom"]);
    }

    #[test]
    fn test_find_by_name() {
        let conn = Database::open_in_memory().unwrap();
        let category = Category::new("Humor".to_string());
        CategoryRepository::create(&conn, &category).unwrap();

        let found = CategoryRepository::find_by_name(&conn, "Humor").unwrap();
        assert_eq!(found.map(|c| c.id), Some(category.id));
        assert!(CategoryRepository::find_by_name(&conn, "Missing").unwrap().is_none());
    }
}
