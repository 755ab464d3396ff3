//! Field resolution — alias lists, table columns, and table-driven volumes.
//!
//! Turns the raw `source`/`destination`/`volume` fields of an instruction
//! block into typed fields ready for broadcasting:
//! 1. bracketed alias lists are expanded into one token per element,
//! 2. tokens are parsed into [`LocationRef`]s,
//! 3. non-well targets are replaced by the rows of a table column,
//! 4. column-referenced volumes are parsed as integers.

use super::error::RecipeError;
use super::location::{is_well_id, split_bracket_list, LocationRef};
use super::tables::ResourceTable;
use super::types::{Field, VolumeField};

/// Expand bracketed alias syntax (`alias:[A1, A2]`) into a flat token list.
///
/// A scalar with no brackets stays a scalar; everything else becomes a list.
pub fn expand_alias_list(field: &Field<String>) -> Result<Field<String>, RecipeError> {
    match field {
        Field::Scalar(token) if !token.contains('[') => Ok(Field::Scalar(token.trim().to_string())),
        Field::Scalar(token) => Ok(Field::List(split_bracket_list(token)?)),
        Field::List(tokens) => {
            let mut expanded = Vec::with_capacity(tokens.len());
            for token in tokens {
                expanded.extend(split_bracket_list(token)?);
            }
            Ok(Field::List(expanded))
        }
    }
}

/// Expand aliases and parse every token.
pub fn parse_locations(field: &Field<String>) -> Result<Field<LocationRef>, RecipeError> {
    expand_alias_list(field)?.try_map(|token| LocationRef::parse(&token))
}

/// First column name a location field refers to, if any.
pub fn first_column(field: &Field<LocationRef>) -> Option<&str> {
    match field {
        Field::Scalar(loc) => (!loc.is_well()).then_some(loc.target.as_str()),
        Field::List(locs) => locs
            .iter()
            .find(|l| !l.is_well())
            .map(|l| l.target.as_str()),
    }
}

/// Replace column-name targets with one location per row of that column.
///
/// Each generated location keeps the original token's alias; the alias is
/// never looked up in the table. Well targets pass through unchanged. Every
/// column value must itself be a well identifier.
pub fn resolve_column_tokens(
    field: Field<LocationRef>,
    table: &ResourceTable,
) -> Result<Field<LocationRef>, RecipeError> {
    let expand = |loc: LocationRef| -> Result<Vec<LocationRef>, RecipeError> {
        if loc.is_well() {
            return Ok(vec![loc]);
        }
        table
            .column(&loc.target)?
            .iter()
            .map(|value| {
                let resolved = loc.with_target(value.to_string());
                if is_well_id(&resolved.target) {
                    Ok(resolved)
                } else {
                    Err(RecipeError::MalformedLocation {
                        token: resolved.to_string(),
                        reason: format!(
                            "value of column '{}' in table '{}' is not a well",
                            loc.target,
                            table.name()
                        ),
                    })
                }
            })
            .collect()
    };

    match field {
        Field::Scalar(loc) if loc.is_well() => Ok(Field::Scalar(loc)),
        Field::Scalar(loc) => Ok(Field::List(expand(loc)?)),
        Field::List(locs) => {
            let mut resolved = Vec::with_capacity(locs.len());
            for loc in locs {
                resolved.extend(expand(loc)?);
            }
            Ok(Field::List(resolved))
        }
    }
}

/// Resolve a volume field to literal integers.
///
/// A column reference needs `table`; its values are parsed in row order.
pub fn resolve_volume(
    field: &VolumeField,
    table: Option<&ResourceTable>,
) -> Result<Field<u32>, RecipeError> {
    match field {
        VolumeField::Scalar(v) => Ok(Field::Scalar(*v)),
        VolumeField::List(vs) => Ok(Field::List(vs.clone())),
        VolumeField::ColumnRef(column) => {
            let table = table.ok_or_else(|| RecipeError::TableSelection {
                column: column.clone(),
                declared: 0,
            })?;
            let volumes = table
                .column(column)?
                .iter()
                .map(|value| {
                    value.as_volume().ok_or_else(|| RecipeError::NonIntegerVolume {
                        column: column.clone(),
                        value: value.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Field::List(volumes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tables::TableValue;
    use indexmap::IndexMap;

    fn scalar(s: &str) -> Field<String> {
        Field::Scalar(s.to_string())
    }

    fn list(items: &[&str]) -> Field<String> {
        Field::List(items.iter().map(|s| s.to_string()).collect())
    }

    fn tokens(field: &Field<LocationRef>) -> Vec<String> {
        field.clone().into_vec().iter().map(|l| l.to_string()).collect()
    }

    fn make_table() -> ResourceTable {
        let mut columns = IndexMap::new();
        columns.insert(
            "dest_wells".to_string(),
            vec![
                TableValue::Text("B1".to_string()),
                TableValue::Text("B2".to_string()),
                TableValue::Text("B3".to_string()),
            ],
        );
        columns.insert(
            "volumes".to_string(),
            vec![
                TableValue::Integer(10),
                TableValue::Float(20.0),
                TableValue::Text("30".to_string()),
            ],
        );
        columns.insert(
            "bad_volumes".to_string(),
            vec![TableValue::Integer(10), TableValue::Text("ten".to_string())],
        );
        ResourceTable::new("plate_map", columns)
    }

    #[test]
    fn test_resolver_expand_scalar_bracket() {
        let f = expand_alias_list(&scalar("rack:[A1, B2, C3]")).unwrap();
        assert_eq!(f, list(&["rack:A1", "rack:B2", "rack:C3"]));
    }

    #[test]
    fn test_resolver_expand_inner_alias_override() {
        let f = expand_alias_list(&scalar("rack:[A1, alias2:B2]")).unwrap();
        assert_eq!(f, list(&["rack:A1", "alias2:B2"]));
    }

    #[test]
    fn test_resolver_expand_list_mixed() {
        let f = expand_alias_list(&list(&["src:A1", "dst:[B1, B2]"])).unwrap();
        assert_eq!(f, list(&["src:A1", "dst:B1", "dst:B2"]));
    }

    #[test]
    fn test_resolver_expand_plain_scalar_untouched() {
        assert_eq!(expand_alias_list(&scalar("plate:A1")).unwrap(), scalar("plate:A1"));
    }

    #[test]
    fn test_resolver_parse_locations_malformed() {
        let err = parse_locations(&list(&["a:b:c"])).unwrap_err();
        assert!(matches!(err, RecipeError::MalformedLocation { .. }));
    }

    #[test]
    fn test_resolver_column_tokens_keep_alias() {
        let field = parse_locations(&scalar("dest:dest_wells")).unwrap();
        assert_eq!(first_column(&field), Some("dest_wells"));
        let resolved = resolve_column_tokens(field, &make_table()).unwrap();
        assert_eq!(tokens(&resolved), vec!["dest:B1", "dest:B2", "dest:B3"]);
    }

    #[test]
    fn test_resolver_column_tokens_wells_pass_through() {
        let field = parse_locations(&list(&["plate:A1", "plate:dest_wells"])).unwrap();
        let resolved = resolve_column_tokens(field, &make_table()).unwrap();
        assert_eq!(
            tokens(&resolved),
            vec!["plate:A1", "plate:B1", "plate:B2", "plate:B3"]
        );
        let well = parse_locations(&scalar("plate:H12")).unwrap();
        assert_eq!(first_column(&well), None);
        assert_eq!(resolve_column_tokens(well.clone(), &make_table()).unwrap(), well);
    }

    #[test]
    fn test_resolver_column_tokens_missing_column() {
        let field = parse_locations(&scalar("plate:nowhere")).unwrap();
        let err = resolve_column_tokens(field, &make_table()).unwrap_err();
        assert_eq!(
            err,
            RecipeError::MissingColumn {
                column: "nowhere".to_string(),
                table: "plate_map".to_string()
            }
        );
    }

    #[test]
    fn test_resolver_column_values_must_be_wells() {
        let mut columns = IndexMap::new();
        columns.insert(
            "targets".to_string(),
            vec![
                TableValue::Text("C1".to_string()),
                TableValue::Text("notawell".to_string()),
            ],
        );
        columns.insert("numbers".to_string(), vec![TableValue::Integer(12)]);
        columns.insert("fractions".to_string(), vec![TableValue::Float(1.5)]);
        let table = ResourceTable::new("layout", columns);

        for (token, bad) in [
            ("dst:targets", "dst:notawell"),
            ("dst:numbers", "dst:12"),
            ("dst:fractions", "dst:1.5"),
        ] {
            let field = parse_locations(&scalar(token)).unwrap();
            let err = resolve_column_tokens(field, &table).unwrap_err();
            match err {
                RecipeError::MalformedLocation { token, reason } => {
                    assert_eq!(token, bad);
                    assert!(reason.contains("is not a well"), "{}", reason);
                }
                other => panic!("expected malformed location, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_resolver_volume_literals() {
        assert_eq!(
            resolve_volume(&VolumeField::Scalar(50), None).unwrap(),
            Field::Scalar(50)
        );
        assert_eq!(
            resolve_volume(&VolumeField::List(vec![1, 2]), None).unwrap(),
            Field::List(vec![1, 2])
        );
    }

    #[test]
    fn test_resolver_volume_from_column() {
        let table = make_table();
        let column = VolumeField::ColumnRef("volumes".to_string());
        let v = resolve_volume(&column, Some(&table)).unwrap();
        assert_eq!(v, Field::List(vec![10, 20, 30]));
    }

    #[test]
    fn test_resolver_volume_non_integer() {
        let table = make_table();
        let err = resolve_volume(
            &VolumeField::ColumnRef("bad_volumes".to_string()),
            Some(&table),
        )
        .unwrap_err();
        assert_eq!(
            err,
            RecipeError::NonIntegerVolume {
                column: "bad_volumes".to_string(),
                value: "ten".to_string()
            }
        );
    }

    #[test]
    fn test_resolver_volume_column_needs_table() {
        let err = resolve_volume(&VolumeField::ColumnRef("volumes".to_string()), None).unwrap_err();
        assert!(matches!(err, RecipeError::TableSelection { .. }));
    }
}
