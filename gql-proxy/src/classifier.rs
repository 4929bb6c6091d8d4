//! Finds the operation a search query asks for.
//!
//! The operation of a query is the name of the first top-level field of its
//! first operation. Queries are checked against the root types of the served
//! schema before they are classified, so a query the resolver would reject
//! never reaches a member.

use crate::errors::{GqlProxyError, Result};
use graphql_parser::query::{Definition, OperationDefinition, Selection, SelectionSet};
use graphql_parser::schema::{self, TypeDefinition, TypeExtension};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Introspection fields every root type answers.
const META_FIELDS: &[&str] = &["__typename"];
/// Introspection fields only the query root answers.
const QUERY_META_FIELDS: &[&str] = &["__schema", "__type"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    const ALL: [OperationKind; 3] = [
        OperationKind::Query,
        OperationKind::Mutation,
        OperationKind::Subscription,
    ];

    /// Root type name used when the schema has no `schema { ... }` definition.
    fn default_root(self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

#[derive(Debug)]
struct RootType {
    name: String,
    fields: HashSet<String>,
}

/// Top-level fields of the schema, keyed by operation kind.
#[derive(Debug)]
pub struct QuerySchema {
    roots: HashMap<OperationKind, RootType>,
}

impl QuerySchema {
    pub fn load(path: &Path) -> Result<Self> {
        let sdl = fs::read_to_string(path)
            .map_err(|e| GqlProxyError::Schema(format!("{}: {e}", path.display())))?;
        Self::parse(&sdl)
    }

    pub fn parse(sdl: &str) -> Result<Self> {
        let document = graphql_parser::parse_schema::<String>(sdl)
            .map_err(|e| GqlProxyError::Schema(e.to_string()))?;

        let mut root_names: HashMap<OperationKind, String> = OperationKind::ALL
            .iter()
            .map(|kind| (*kind, kind.default_root().to_string()))
            .collect();
        let mut object_fields: HashMap<String, HashSet<String>> = HashMap::new();

        for definition in document.definitions {
            match definition {
                schema::Definition::SchemaDefinition(def) => {
                    root_names.clear();
                    let named = [
                        (OperationKind::Query, def.query),
                        (OperationKind::Mutation, def.mutation),
                        (OperationKind::Subscription, def.subscription),
                    ];
                    for (kind, name) in named {
                        if let Some(name) = name {
                            root_names.insert(kind, name);
                        }
                    }
                }
                schema::Definition::TypeDefinition(TypeDefinition::Object(object)) => {
                    object_fields
                        .entry(object.name)
                        .or_default()
                        .extend(object.fields.into_iter().map(|field| field.name));
                }
                schema::Definition::TypeExtension(TypeExtension::Object(extension)) => {
                    object_fields
                        .entry(extension.name)
                        .or_default()
                        .extend(extension.fields.into_iter().map(|field| field.name));
                }
                _ => {}
            }
        }

        let mut roots = HashMap::new();
        for (kind, name) in root_names {
            match object_fields.remove(&name) {
                Some(fields) => {
                    roots.insert(kind, RootType { name, fields });
                }
                None if kind == OperationKind::Query => {
                    return Err(GqlProxyError::Schema(format!(
                        "query root type {name} is not defined"
                    )));
                }
                None => {}
            }
        }

        Ok(Self { roots })
    }

    /// Returns the operation name of `query`.
    pub fn classify(&self, query: &str) -> Result<String> {
        let document = graphql_parser::parse_query::<String>(query)
            .map_err(|e| GqlProxyError::Parse(e.to_string()))?;

        let mut operation = None;
        for definition in &document.definitions {
            let Definition::Operation(op) = definition else {
                continue;
            };
            let (kind, selection_set) = split_operation(op);
            self.check_fields(kind, selection_set)?;

            if operation.is_none() {
                operation = Some(match selection_set.items.first() {
                    Some(Selection::Field(field)) => Ok(field.name.clone()),
                    _ => Err(GqlProxyError::UnknownOperation),
                });
            }
        }

        operation.unwrap_or(Err(GqlProxyError::UnknownOperation))
    }

    fn check_fields(&self, kind: OperationKind, selection_set: &SelectionSet<'_, String>) -> Result<()> {
        let root = self.roots.get(&kind);
        let root_name = root.map_or(kind.default_root(), |root| root.name.as_str());

        for item in &selection_set.items {
            let Selection::Field(field) = item else {
                continue;
            };
            let name = field.name.as_str();
            let known = META_FIELDS.contains(&name)
                || (kind == OperationKind::Query && QUERY_META_FIELDS.contains(&name))
                || root.is_some_and(|root| root.fields.contains(name));

            if !known {
                return Err(GqlProxyError::SchemaViolation {
                    root: root_name.to_string(),
                    field: name.to_string(),
                });
            }
        }

        Ok(())
    }
}

fn split_operation<'d, 'a>(
    op: &'d OperationDefinition<'a, String>,
) -> (OperationKind, &'d SelectionSet<'a, String>) {
    match op {
        OperationDefinition::SelectionSet(set) => (OperationKind::Query, set),
        OperationDefinition::Query(query) => (OperationKind::Query, &query.selection_set),
        OperationDefinition::Mutation(mutation) => (OperationKind::Mutation, &mutation.selection_set),
        OperationDefinition::Subscription(subscription) => {
            (OperationKind::Subscription, &subscription.selection_set)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        type Query {
            GlobalSearch(query: String!): GlobalSearchResult!
            ImageList(repo: String!): PaginatedImagesResult!
        }

        extend type Query {
            ExpandedRepoInfo(repo: String!): RepoInfo!
        }

        type GlobalSearchResult {
            Page: PageInfo
        }
    "#;

    fn schema() -> QuerySchema {
        QuerySchema::parse(SCHEMA).unwrap()
    }

    #[test]
    fn test_first_field_of_first_operation() {
        let schema = schema();
        assert_eq!(
            schema
                .classify(r#"{ GlobalSearch(query: "alpine") { Page { TotalCount } } }"#)
                .unwrap(),
            "GlobalSearch"
        );
        assert_eq!(
            schema
                .classify(
                    r#"query Q { ImageList(repo: "a") { Page { ItemCount } } GlobalSearch(query: "") { Page { ItemCount } } }
                       query R { GlobalSearch(query: "") { Page { ItemCount } } }"#
                )
                .unwrap(),
            "ImageList"
        );
    }

    #[test]
    fn test_alias_does_not_change_operation() {
        let op = schema()
            .classify(r#"{ search: GlobalSearch(query: "a") { Page { TotalCount } } }"#)
            .unwrap();
        assert_eq!(op, "GlobalSearch");
    }

    #[test]
    fn test_extension_fields_are_known() {
        let op = schema()
            .classify(r#"{ ExpandedRepoInfo(repo: "zot") { Summary { Name } } }"#)
            .unwrap();
        assert_eq!(op, "ExpandedRepoInfo");
    }

    #[test]
    fn test_parse_error() {
        let err = schema().classify("{ GlobalSearch(").unwrap_err();
        assert!(matches!(err, GqlProxyError::Parse(_)), "{err:?}");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = schema().classify("{ DeleteEverything }").unwrap_err();
        assert_eq!(
            err,
            GqlProxyError::SchemaViolation {
                root: "Query".into(),
                field: "DeleteEverything".into()
            }
        );

        // later operations are checked too
        let err = schema()
            .classify(r#"query A { GlobalSearch(query: "") { Page { ItemCount } } } query B { Nope }"#)
            .unwrap_err();
        assert!(matches!(err, GqlProxyError::SchemaViolation { .. }));
    }

    #[test]
    fn test_mutation_without_root_type() {
        let err = schema().classify("mutation { GlobalSearch }").unwrap_err();
        assert_eq!(
            err,
            GqlProxyError::SchemaViolation {
                root: "Mutation".into(),
                field: "GlobalSearch".into()
            }
        );
    }

    #[test]
    fn test_undeterminable_operation() {
        let schema = schema();

        let err = schema
            .classify("query { ...Search } fragment Search on Query { GlobalSearch(query: \"\") { Page { ItemCount } } }")
            .unwrap_err();
        assert_eq!(err, GqlProxyError::UnknownOperation);

        let err = schema
            .classify("fragment Search on Query { GlobalSearch(query: \"\") { Page { ItemCount } } }")
            .unwrap_err();
        assert_eq!(err, GqlProxyError::UnknownOperation);
    }

    #[test]
    fn test_introspection_fields() {
        let schema = schema();
        assert_eq!(schema.classify("{ __typename }").unwrap(), "__typename");
        assert_eq!(schema.classify("{ __schema { queryType { name } } }").unwrap(), "__schema");
    }

    #[test]
    fn test_schema_definition_renames_roots() {
        let schema = QuerySchema::parse(
            r#"
            schema { query: SearchRoot }
            type SearchRoot { GlobalSearch(query: String!): String }
            type Query { ImageList: String }
            "#,
        )
        .unwrap();

        assert_eq!(schema.classify(r#"{ GlobalSearch(query: "a") }"#).unwrap(), "GlobalSearch");
        assert_eq!(
            schema.classify("{ ImageList }").unwrap_err(),
            GqlProxyError::SchemaViolation {
                root: "SearchRoot".into(),
                field: "ImageList".into()
            }
        );
    }

    #[test]
    fn test_invalid_schema() {
        assert!(matches!(
            QuerySchema::parse("type Query {").unwrap_err(),
            GqlProxyError::Schema(_)
        ));
        assert!(matches!(
            QuerySchema::parse("type Image { Digest: String }").unwrap_err(),
            GqlProxyError::Schema(_)
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = QuerySchema::load(Path::new("/nonexistent/schema.graphql")).unwrap_err();
        assert!(matches!(err, GqlProxyError::Schema(_)));
    }
}
