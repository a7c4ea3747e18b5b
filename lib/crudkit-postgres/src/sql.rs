//! SQL rendering for crudkit queries.
//!
//! Identifiers are double-quoted; values are always `$n` parameters, bound
//! in the order the filters and assignments appear.

use crudkit::{Delete, Filter, Order, Query, Update};

/// Quote an identifier for PostgreSQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Build a WHERE clause from filters and return the SQL and argument count.
pub fn build_where_clause(filters: &[Filter], start_param: usize) -> (String, usize) {
    if filters.is_empty() {
        return (String::new(), 0);
    }

    let mut clauses = Vec::with_capacity(filters.len());
    let mut param_idx = start_param;

    for filter in filters {
        let clause = match filter {
            Filter::Eq(field, _) => {
                let c = format!("{} = ${}", quote_ident(field), param_idx);
                param_idx += 1;
                c
            }
            Filter::IsNull(field) => format!("{} IS NULL", quote_ident(field)),
        };
        clauses.push(clause);
    }

    let param_count = param_idx - start_param;
    (format!(" WHERE {}", clauses.join(" AND ")), param_count)
}

/// Build ORDER BY clause.
pub fn build_order_clause(order_by: &[(String, Order)]) -> String {
    if order_by.is_empty() {
        return String::new();
    }

    let clauses: Vec<String> = order_by
        .iter()
        .map(|(field, order)| format!("{} {}", quote_ident(field), order.as_sql()))
        .collect();

    format!(" ORDER BY {}", clauses.join(", "))
}

pub fn select_sql<T>(query: &Query<T>) -> String {
    let (where_clause, _) = build_where_clause(&query.filters, 1);
    let mut sql = format!(
        "SELECT * FROM {}{}{}",
        quote_ident(&query.table),
        where_clause,
        build_order_clause(&query.order_by)
    );

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = query.offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }
    sql
}

pub fn count_sql<T>(query: &Query<T>) -> String {
    let (where_clause, _) = build_where_clause(&query.filters, 1);
    format!(
        "SELECT COUNT(*) FROM {}{}",
        quote_ident(&query.table),
        where_clause
    )
}

/// INSERT returning the stored row. With no columns every column takes its
/// default.
pub fn insert_sql(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quote_ident(table));
    }

    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        quote_ident(table),
        cols.join(", "),
        placeholders.join(", ")
    )
}

/// UPDATE returning the refreshed rows. Assignments bind before filters.
pub fn update_sql<T>(update: &Update<T>) -> String {
    let assignments: Vec<String> = update
        .assignments
        .iter()
        .enumerate()
        .map(|(idx, (field, _))| format!("{} = ${}", quote_ident(field), idx + 1))
        .collect();
    let (where_clause, _) = build_where_clause(&update.filters, assignments.len() + 1);

    format!(
        "UPDATE {} SET {}{} RETURNING *",
        quote_ident(&update.table),
        assignments.join(", "),
        where_clause
    )
}

pub fn delete_sql<T>(delete: &Delete<T>) -> String {
    let (where_clause, _) = build_where_clause(&delete.filters, 1);
    format!("DELETE FROM {}{}", quote_ident(&delete.table), where_clause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crudkit::Value;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, crudkit::Entity)]
    #[entity(table = "samples")]
    struct Sample {
        id: i64,
        name: String,
        description: Option<String>,
    }

    #[test]
    fn select_with_filters_order_and_paging() {
        let query = Query::<Sample>::new()
            .eq("name", "alpha")
            .eq("description", Value::Null)
            .order_by("id", Order::Desc)
            .offset(20)
            .limit(10);

        assert_eq!(
            select_sql(&query),
            "SELECT * FROM \"samples\" WHERE \"name\" = $1 AND \"description\" IS NULL \
             ORDER BY \"id\" DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn count_ignores_order_and_paging() {
        let query = Query::<Sample>::new()
            .eq("name", "alpha")
            .order_by("id", Order::Asc)
            .limit(5);

        assert_eq!(
            count_sql(&query),
            "SELECT COUNT(*) FROM \"samples\" WHERE \"name\" = $1"
        );
    }

    #[test]
    fn update_numbers_filters_after_assignments() {
        let update = Update::<Sample>::new()
            .set("name", "beta")
            .set("description", "text")
            .eq("id", 7i64);

        assert_eq!(
            update_sql(&update),
            "UPDATE \"samples\" SET \"description\" = $1, \"name\" = $2 WHERE \"id\" = $3 RETURNING *"
        );
    }

    #[test]
    fn insert_and_delete() {
        assert_eq!(
            insert_sql("samples", &["name", "description"]),
            "INSERT INTO \"samples\" (\"name\", \"description\") VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(
            insert_sql("samples", &[]),
            "INSERT INTO \"samples\" DEFAULT VALUES RETURNING *"
        );
        assert_eq!(
            delete_sql(&Delete::<Sample>::new().eq("id", 1i64)),
            "DELETE FROM \"samples\" WHERE \"id\" = $1"
        );
    }

    #[test]
    fn identifiers_are_escaped() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
