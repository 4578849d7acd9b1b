//! Table and column management operators.

use rand::seq::SliceRandom;

use crate::error::EvalError;
use crate::registry::{OpCall, OpDescriptor, OpValue, Rank, RankOut, Registry};
use crate::session::Session;
use crate::table::{Column, RowAccess, Table};
use crate::value::Value;

pub fn register(registry: &Registry) {
    registry.register(OpDescriptor::new("take", Rank::Nested, RankOut::Nested, op_take));
    registry.register(OpDescriptor::new("name", Rank::Nested, RankOut::Nested, op_name));
    registry.register(OpDescriptor::new("ref", Rank::Nested, RankOut::Nested, op_ref));
    registry.register(OpDescriptor::new("columns", Rank::Nested, RankOut::Nested, op_columns));
    registry.alias("select", "columns");
    registry.register(OpDescriptor::new("sort", Rank::Nested, RankOut::Nested, op_sort));
    registry.register(OpDescriptor::new("grade-up", Rank::Nested, RankOut::Vector, op_grade_up));
    registry.register(OpDescriptor::new("dedup", Rank::Vector, RankOut::Vector, op_dedup));
    registry.register(OpDescriptor::new("filter", Rank::Nested, RankOut::Nested, op_filter));
    registry.register(OpDescriptor::new("sample", Rank::Nested, RankOut::Nested, op_sample));
    registry.register(OpDescriptor::new("ravel", Rank::Any, RankOut::Nested, op_ravel));
    registry.register(OpDescriptor::new("unbox", Rank::Any, RankOut::Nested, op_unbox));
    registry.register(OpDescriptor::new("groupby", Rank::Nested, RankOut::Nested, op_groupby));
    registry.register(
        OpDescriptor::new("cross", Rank::Row, RankOut::Nested, op_cross)
            .arity(2)
            .rankin2(Rank::Nested),
    );
    registry.register(OpDescriptor::new("global", Rank::Any, RankOut::Nested, op_global));
}

/// First `n` rows.
fn op_take(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let t = call.table()?;
    let n = call.int_arg(0).unwrap_or(1).max(0) as usize;
    let mut out = t.clone_structure();
    for id in t.rows().iter().take(n) {
        out.push_row(*id);
    }
    Ok(OpValue::Table(out))
}

/// Rename the current (last) column.
fn op_name(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let name = call
        .str_arg(0)
        .ok_or_else(|| EvalError::Op("name requires a column name".into()))?;
    let t = call.table()?;
    let mut cols = t.columns().to_vec();
    match cols.last_mut() {
        Some(last) => last.name = name,
        None => return Err(EvalError::Op("table has no columns".into())),
    }
    let mut out = t.clone();
    out.set_columns(cols);
    Ok(OpValue::Table(out))
}

/// Move a named column to the end, making it the new current value.
fn op_ref(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let name = call
        .str_arg(0)
        .ok_or_else(|| EvalError::Op("ref requires a column name".into()))?;
    let t = call.table()?;
    let col = t
        .get_column(&name)
        .cloned()
        .ok_or_else(|| EvalError::NoSuchColumn(name.clone()))?;
    let mut cols: Vec<Column> = t
        .columns()
        .iter()
        .filter(|c| c.key != col.key)
        .cloned()
        .collect();
    cols.push(col);
    let mut out = t.clone();
    out.set_columns(cols);
    Ok(OpValue::Table(out))
}

/// Restrict the table to the named columns, keeping the original reachable
/// as the parent table so its other columns still resolve.
fn op_columns(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let t = call.table()?;
    let mut cols = Vec::new();
    for arg in &call.args {
        let name = arg.to_string();
        let col = t
            .get_column(&name)
            .cloned()
            .ok_or_else(|| EvalError::NoSuchColumn(name.clone()))?;
        cols.push(col);
    }
    let mut out = t.clone();
    out.set_columns(cols);
    out.set_parent(t.clone());
    Ok(OpValue::Table(out))
}

/// Stable sort of rows by the named columns (default: the current column).
fn op_sort(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let t = call.table()?;
    let cols: Vec<Column> = if call.args.is_empty() {
        t.current_column().cloned().into_iter().collect()
    } else {
        let mut cols = Vec::new();
        for arg in &call.args {
            let name = arg.to_string();
            cols.push(
                t.get_column(&name)
                    .cloned()
                    .ok_or_else(|| EvalError::NoSuchColumn(name))?,
            );
        }
        cols
    };

    let mut keyed: Vec<(Vec<Value>, usize)> = t
        .rows()
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let key = cols
                .iter()
                .map(|c| c.get_value(t.arena(), *id).unwrap_or(Value::Null))
                .collect();
            (key, i)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| x.compare(y))
            .find(|o| !o.is_eq())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut out = t.clone_structure();
    for (_, i) in keyed {
        out.push_row(t.rows()[i]);
    }
    Ok(OpValue::Table(out))
}

/// Indices that would sort the current column's values.
fn op_grade_up(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let values = call.table()?.values();
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|a, b| values[*a].compare(&values[*b]));
    Ok(OpValue::Values(
        indices.into_iter().map(|i| Value::Int(i as i64)).collect(),
    ))
}

/// Deduplicate leaf values, keeping first appearances in order.
fn op_dedup(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for v in call.values()? {
        let repr = v.to_json().to_string();
        if !seen.contains(&repr) {
            seen.push(repr);
            out.push(v.clone());
        }
    }
    Ok(OpValue::Values(out))
}

/// Keep only rows whose current value is truthy, then discard that column.
fn op_filter(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let t = call.table()?;
    let mut out = t.clone_structure();
    for row in t.iter() {
        if row.value_or_null().truthy() {
            out.push_row(row.id());
        }
    }
    let mut cols = out.columns().to_vec();
    cols.pop();
    out.set_columns(cols);
    Ok(OpValue::Table(out))
}

/// `n` randomly sampled rows.
fn op_sample(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let t = call.table()?;
    let n = call.int_arg(0).unwrap_or(1).max(0) as usize;
    let mut rng = rand::thread_rng();
    let chosen = t.rows().choose_multiple(&mut rng, n.min(t.len()));
    let mut out = t.clone_structure();
    for id in chosen {
        out.push_row(*id);
    }
    Ok(OpValue::Table(out))
}

/// Flatten all leaf values of a nested table into a rank-1 table, each row
/// parent-linked to the row it came from.
fn op_ravel(session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    fn walk(t: &Table, key: &str, out: &mut Table) {
        for row in t.iter() {
            match row.value() {
                Some(Value::Table(nested)) => walk(&nested, key, out),
                Some(v) => {
                    let id = out
                        .arena()
                        .alloc(vec![(key.to_string(), v)], Some(row.id()));
                    out.push_row(id);
                }
                None => {}
            }
        }
    }

    let t = call.table()?;
    let key = session.unique_key();
    let mut out = Table::new(session.arena().clone());
    walk(t, &key, &mut out);
    out.add_column(Column::auto(&key));
    Ok(OpValue::Table(out))
}

/// Remove the outermost layer of a single-row table.
fn op_unbox(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let t = call.table()?;
    if t.len() != 1 {
        return Err(EvalError::Op(format!(
            "unbox requires a single-row table, got {} rows",
            t.len()
        )));
    }
    match t.iter().next().and_then(|r| r.value()) {
        Some(Value::Table(inner)) => Ok(OpValue::Table(inner)),
        _ => Err(EvalError::TypeMismatch {
            expected: "table",
            actual: "scalar",
        }),
    }
}

/// Group rows by the named columns; each output row holds the key columns
/// plus a nested table of its member rows.
fn op_groupby(session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let t = call.table()?;
    let colnames: Vec<String> = call.args.iter().map(|v| v.to_string()).collect();

    // groupkey (canonical form) -> (key values, member row ids)
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, (Vec<Value>, Vec<crate::table::RowId>)> =
        std::collections::HashMap::new();
    for row in t.iter() {
        let mut keyvals = Vec::new();
        for name in &colnames {
            keyvals.push(row.require(name)?);
        }
        let repr = keyvals
            .iter()
            .map(|v| v.to_json().to_string())
            .collect::<Vec<_>>()
            .join("\u{1f}");
        groups
            .entry(repr.clone())
            .or_insert_with(|| {
                order.push(repr.clone());
                (keyvals, Vec::new())
            })
            .1
            .push(row.id());
    }

    let newkey = session.unique_key();
    let mut out = Table::new(session.arena().clone());
    for repr in order {
        if let Some((keyvals, ids)) = groups.remove(&repr) {
            let mut members = t.clone_structure();
            for id in ids {
                members.push_row(id);
            }
            let mut cells: Vec<(String, Value)> = colnames
                .iter()
                .cloned()
                .zip(keyvals)
                .collect();
            cells.push((newkey.clone(), Value::Table(members)));
            out.add_row(cells, None);
        }
    }
    out.add_column(Column::auto(&newkey));
    Ok(OpValue::Table(out))
}

/// Cross product of the current row with every row of the second operand:
/// one output row per right-hand row, parent-linked to the current row so
/// both sides' columns stay resolvable.
fn op_cross(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let left = call.row()?;
    let right = match &call.second {
        crate::registry::OpInput::Table(t) => t.clone(),
        other => {
            return Err(EvalError::TypeMismatch {
                expected: "table",
                actual: other.kind(),
            })
        }
    };

    let mut out = Table::new(right.arena().clone());
    for rrow in right.iter() {
        let cells = right.arena().cells(rrow.id());
        let id = out.arena().alloc(cells, Some(left.id()));
        out.push_row(id);
    }
    for col in left.table().columns() {
        out.add_column(Column::parented(col.clone()));
    }
    for col in right.columns() {
        out.add_column(col.clone());
    }
    Ok(OpValue::Table(out))
}

/// Save the input table into the global namespace under the given name.
fn op_global(session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let name = call
        .str_arg(0)
        .ok_or_else(|| EvalError::Op("global requires a name".into()))?;
    let t = call.table()?.clone();
    session.set_global(&name, Value::Table(t.clone()));
    Ok(OpValue::Table(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{OpInput, Registry};
    use crate::table::RowArena;
    use pretty_assertions::assert_eq;

    fn vector_call(values: &[&str]) -> OpCall {
        OpCall {
            input: OpInput::Values(values.iter().map(|s| Value::Str(s.to_string())).collect()),
            second: OpInput::None,
            args: Vec::new(),
            kwargs: Vec::new(),
            prompt: None,
        }
    }

    fn table_call(t: Table, args: &[Value]) -> OpCall {
        OpCall {
            input: OpInput::Table(t),
            second: OpInput::None,
            args: args.to_vec(),
            kwargs: Vec::new(),
            prompt: None,
        }
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        let session = Session::new(Registry::new());
        let out = op_dedup(&session, vector_call(&["b", "a", "b", "c", "a"])).expect("dedups");
        match out {
            OpValue::Values(vs) => assert_eq!(
                vs,
                vec![
                    Value::Str("b".into()),
                    Value::Str("a".into()),
                    Value::Str("c".into())
                ]
            ),
            other => panic!("expected values, got {:?}", other),
        }
    }

    #[test]
    fn grade_up_indexes_the_sorted_order() {
        let session = Session::new(Registry::new());
        let t = Table::from_values(
            RowArena::new(),
            "_0",
            ["3", "1", "4", "2", "8", "5"]
                .iter()
                .map(|s| Value::Str(s.to_string()))
                .collect(),
        );
        let out = op_grade_up(&session, table_call(t, &[])).expect("grades");
        match out {
            OpValue::Values(vs) => {
                let idx: Vec<i64> = vs.iter().filter_map(|v| v.as_int()).collect();
                assert_eq!(idx, vec![1, 3, 0, 2, 5, 4]);
            }
            other => panic!("expected values, got {:?}", other),
        }
    }

    #[test]
    fn sort_is_stable_on_equal_keys() {
        let session = Session::new(Registry::new());
        let mut t = Table::new(RowArena::new());
        for (k, v) in [("x", 1), ("x", 2), ("a", 3), ("x", 4)] {
            t.add_row(
                vec![
                    ("k".to_string(), Value::Str(k.to_string())),
                    ("v".to_string(), Value::Int(v)),
                ],
                None,
            );
        }
        let out = op_sort(&session, table_call(t, &[Value::Str("k".into())])).expect("sorts");
        match out {
            OpValue::Table(sorted) => {
                let vs: Vec<Value> = sorted.iter().filter_map(|r| r.get("v")).collect();
                assert_eq!(
                    vs,
                    vec![Value::Int(3), Value::Int(1), Value::Int(2), Value::Int(4)]
                );
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn unbox_rejects_multi_row_tables() {
        let session = Session::new(Registry::new());
        let t = Table::from_values(
            RowArena::new(),
            "_0",
            vec![Value::Int(1), Value::Int(2)],
        );
        assert!(op_unbox(&session, table_call(t, &[])).is_err());
    }
}
