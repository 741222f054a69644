// ============================================================
// Layer 3b — Grammar, Productions and Logical Forms
// ============================================================
// The grammar is a fixed list of productions, each written as
// an action string `LHS -> rhs`:
//
//   @start@ -> PassageSpanAnswer                  (pick a start type)
//   PassageSpanAnswer -> find_passageSpanAnswer   (pick a function;
//                                                  its argument types
//                                                  become new nonterminals)
//
// An action sequence is the pre-order walk of a program tree.
// A logical form is the same tree printed as an s-expression:
//
//   (find_passageSpanAnswer (compare_date_greater_than
//        find_PassageAttention find_PassageAttention))
//
//   @start@ -> PassageSpanAnswer
//   PassageSpanAnswer -> find_passageSpanAnswer
//   PassageAttention -> compare_date_greater_than
//   PassageAttention -> find_PassageAttention
//   PassageAttention -> find_PassageAttention
//
// Action ids are positions in the sorted production list, so
// the same grammar always yields the same ids.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::language::error::LanguageError;
use crate::language::types::{Function, NodeType};

// ─── Production ───────────────────────────────────────────────────────────────
/// One grammar rule: expanding `lhs` with `rhs` pushes `children`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    pub lhs:      NodeType,
    pub rhs:      String,
    pub children: Vec<NodeType>,
}

impl Production {
    pub fn new(lhs: NodeType, rhs: impl Into<String>, children: Vec<NodeType>) -> Self {
        Self { lhs, rhs: rhs.into(), children }
    }

    /// `@start@ -> T`
    pub fn start(start_type: NodeType) -> Self {
        Self::new(NodeType::Start, start_type.name(), vec![start_type])
    }

    pub fn function(function: Function) -> Self {
        Self::new(
            function.return_type(),
            function.name(),
            function.argument_types().to_vec(),
        )
    }

    pub fn action(&self) -> String {
        format!("{} -> {}", self.lhs, self.rhs)
    }
}

impl fmt::Display for Production {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.lhs, self.rhs)
    }
}

// ─── ProductionTable ──────────────────────────────────────────────────────────
/// Productions indexed by action id and by left-hand side.
#[derive(Debug, Clone)]
pub struct ProductionTable {
    productions: Vec<Production>,
    by_lhs:      HashMap<NodeType, Vec<usize>>,
    index:       HashMap<String, usize>,
}

impl ProductionTable {
    /// Sorts by action string and drops duplicates so ids are stable.
    pub fn new(mut productions: Vec<Production>) -> Self {
        productions.sort_by_key(|p| p.action());
        productions.dedup_by(|a, b| a.action() == b.action());

        let mut by_lhs: HashMap<NodeType, Vec<usize>> = HashMap::new();
        let mut index = HashMap::with_capacity(productions.len());
        for (id, production) in productions.iter().enumerate() {
            by_lhs.entry(production.lhs).or_default().push(id);
            index.insert(production.action(), id);
        }

        Self { productions, by_lhs, index }
    }

    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    pub fn get(&self, action_id: usize) -> Option<&Production> {
        self.productions.get(action_id)
    }

    pub fn id_of(&self, action: &str) -> Option<usize> {
        self.index.get(action).copied()
    }

    /// Action ids whose left-hand side is `lhs`, in id order.
    pub fn actions_for(&self, lhs: NodeType) -> &[usize] {
        self.by_lhs.get(&lhs).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn actions(&self) -> Vec<String> {
        self.productions.iter().map(Production::action).collect()
    }
}

// ─── Program trees ────────────────────────────────────────────────────────────
/// A function application inside a program. `action_index` is the
/// position of the action that selected this function in the
/// program's action sequence (side-args are aligned to it).
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramNode {
    pub function:     Function,
    pub action_index: usize,
    pub args:         Vec<ProgramNode>,
}

/// A complete, type-checked program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub start_type: NodeType,
    pub root:       ProgramNode,
}

impl Program {
    pub fn to_logical_form(&self) -> String {
        let mut out = String::new();
        render_node(&self.root, &mut out);
        out
    }

    pub fn to_action_sequence(&self) -> Vec<String> {
        let mut actions = vec![Production::start(self.start_type).action()];
        collect_actions(&self.root, &mut actions);
        actions
    }
}

fn render_node(node: &ProgramNode, out: &mut String) {
    if node.args.is_empty() {
        out.push_str(node.function.name());
        return;
    }
    out.push('(');
    out.push_str(node.function.name());
    for arg in &node.args {
        out.push(' ');
        render_node(arg, out);
    }
    out.push(')');
}

fn collect_actions(node: &ProgramNode, actions: &mut Vec<String>) {
    actions.push(node.function.action());
    for arg in &node.args {
        collect_actions(arg, actions);
    }
}

// ─── DropGrammar ──────────────────────────────────────────────────────────────
/// The DROP program grammar. Cheap to clone (shared table).
#[derive(Debug, Clone)]
pub struct DropGrammar {
    table: Arc<ProductionTable>,
}

impl Default for DropGrammar {
    fn default() -> Self {
        Self::new()
    }
}

impl DropGrammar {
    pub fn new() -> Self {
        let mut productions: Vec<Production> = NodeType::START_TYPES
            .iter()
            .map(|&t| Production::start(t))
            .collect();
        productions.extend(Function::ALL.iter().map(|&f| Production::function(f)));

        Self { table: Arc::new(ProductionTable::new(productions)) }
    }

    pub fn table(&self) -> Arc<ProductionTable> {
        Arc::clone(&self.table)
    }

    /// Ordered action vocabulary. Deterministic for a given grammar.
    pub fn all_possible_productions(&self) -> Vec<String> {
        self.table.actions()
    }

    /// Action ids of `@start@ -> T` for each requested start type.
    pub fn start_action_ids<'a>(
        &self,
        start_types: impl IntoIterator<Item = &'a NodeType>,
    ) -> Vec<usize> {
        start_types
            .into_iter()
            .filter_map(|t| self.table.id_of(&Production::start(*t).action()))
            .collect()
    }

    /// Reduce an action sequence to a single typed program.
    pub fn parse_actions(&self, actions: &[String]) -> Result<Program, LanguageError> {
        let first = actions
            .first()
            .ok_or_else(|| LanguageError::malformed("empty action sequence"))?;
        let start = self.lookup(first)?;
        if start.lhs != NodeType::Start {
            return Err(LanguageError::malformed(format!(
                "program must begin with a start action, got '{first}'"
            )));
        }
        let start_type = match start.children.as_slice() {
            [t] if t.is_start_type() => *t,
            _ => return Err(LanguageError::malformed(format!("bad start action '{first}'"))),
        };

        let mut cursor = 1;
        let root = self.parse_node(actions, &mut cursor, start_type)?;
        if cursor != actions.len() {
            return Err(LanguageError::malformed(format!(
                "{} trailing action(s) after a complete program",
                actions.len() - cursor
            )));
        }

        Ok(Program { start_type, root })
    }

    fn parse_node(
        &self,
        actions:  &[String],
        cursor:   &mut usize,
        expected: NodeType,
    ) -> Result<ProgramNode, LanguageError> {
        let action_index = *cursor;
        let action = actions.get(action_index).ok_or_else(|| {
            LanguageError::malformed(format!("incomplete derivation: missing {expected}"))
        })?;
        let production = self.lookup(action)?;
        if production.lhs != expected {
            return Err(LanguageError::malformed(format!(
                "expected a {expected} action, got '{action}'"
            )));
        }
        let function: Function = production
            .rhs
            .parse()
            .map_err(|_| LanguageError::malformed(format!("'{action}' does not name a function")))?;

        *cursor += 1;
        let args = function
            .argument_types()
            .iter()
            .map(|&arg_type| self.parse_node(actions, cursor, arg_type))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProgramNode { function, action_index, args })
    }

    fn lookup(&self, action: &str) -> Result<&Production, LanguageError> {
        self.table
            .id_of(action)
            .and_then(|id| self.table.get(id))
            .ok_or_else(|| LanguageError::malformed(format!("unknown action '{action}'")))
    }

    pub fn action_sequence_to_logical_form(
        &self,
        actions: &[String],
    ) -> Result<String, LanguageError> {
        Ok(self.parse_actions(actions)?.to_logical_form())
    }

    pub fn logical_form_to_action_sequence(
        &self,
        logical_form: &str,
    ) -> Result<Vec<String>, LanguageError> {
        Ok(self.parse_logical_form(logical_form)?.to_action_sequence())
    }

    /// Parse and type-check an s-expression logical form.
    pub fn parse_logical_form(&self, logical_form: &str) -> Result<Program, LanguageError> {
        let tokens = tokenize(logical_form);
        let mut pos = 0;
        let expr = parse_sexpr(&tokens, &mut pos)
            .map_err(|reason| LanguageError::invalid_lf(logical_form, reason))?;
        if pos != tokens.len() {
            return Err(LanguageError::invalid_lf(logical_form, "unexpected trailing tokens"));
        }

        let mut next_action = 1;
        let root = build_node(&expr, &mut next_action)
            .map_err(|reason| LanguageError::invalid_lf(logical_form, reason))?;
        let start_type = root.function.return_type();
        if !start_type.is_start_type() {
            return Err(LanguageError::invalid_lf(
                logical_form,
                format!("{start_type} is not a valid program result"),
            ));
        }

        Ok(Program { start_type, root })
    }
}

// ─── S-expression parsing ─────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
enum SExpr {
    Atom(String),
    List(Vec<SExpr>),
}

fn tokenize(text: &str) -> Vec<String> {
    text.replace('(', " ( ")
        .replace(')', " ) ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn parse_sexpr(tokens: &[String], pos: &mut usize) -> Result<SExpr, String> {
    let token = tokens.get(*pos).ok_or("unexpected end of input")?;
    *pos += 1;
    match token.as_str() {
        "(" => {
            let mut items = Vec::new();
            loop {
                match tokens.get(*pos).map(String::as_str) {
                    Some(")") => {
                        *pos += 1;
                        return Ok(SExpr::List(items));
                    }
                    Some(_) => items.push(parse_sexpr(tokens, pos)?),
                    None => return Err("unbalanced parentheses".to_string()),
                }
            }
        }
        ")" => Err("unexpected ')'".to_string()),
        atom => Ok(SExpr::Atom(atom.to_string())),
    }
}

fn build_node(expr: &SExpr, next_action: &mut usize) -> Result<ProgramNode, String> {
    let (name, arg_exprs): (&str, &[SExpr]) = match expr {
        SExpr::Atom(name) => (name.as_str(), &[]),
        SExpr::List(items) => match items.split_first() {
            Some((SExpr::Atom(name), rest)) => (name.as_str(), rest),
            Some((SExpr::List(_), _)) => return Err("function position holds a list".to_string()),
            None => return Err("empty application '()'".to_string()),
        },
    };

    let function: Function = name.parse().map_err(|e: LanguageError| e.to_string())?;
    if arg_exprs.len() != function.arity() {
        return Err(format!(
            "{name} takes {} argument(s), got {}",
            function.arity(),
            arg_exprs.len()
        ));
    }

    let action_index = *next_action;
    *next_action += 1;

    let mut args = Vec::with_capacity(arg_exprs.len());
    for (arg_expr, &expected) in arg_exprs.iter().zip(function.argument_types()) {
        let arg = build_node(arg_expr, next_action)?;
        let got = arg.function.return_type();
        if got != expected {
            return Err(format!("{name} expects {expected}, got {got}"));
        }
        args.push(arg);
    }

    Ok(ProgramNode { function, action_index, args })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const DATE_COMPARE_LF: &str = "(find_passageSpanAnswer (compare_date_greater_than find_PassageAttention find_PassageAttention))";

    #[test]
    fn test_productions_are_sorted_and_stable() {
        let grammar = DropGrammar::new();
        let first   = grammar.all_possible_productions();
        let second  = DropGrammar::new().all_possible_productions();
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted);
        assert_eq!(first.len(), NodeType::START_TYPES.len() + Function::ALL.len());
    }

    #[test]
    fn test_logical_form_to_actions() {
        let grammar = DropGrammar::new();
        let actions = grammar.logical_form_to_action_sequence(DATE_COMPARE_LF).unwrap();
        assert_eq!(
            actions,
            vec![
                "@start@ -> PassageSpanAnswer",
                "PassageSpanAnswer -> find_passageSpanAnswer",
                "PassageAttention -> compare_date_greater_than",
                "PassageAttention -> find_PassageAttention",
                "PassageAttention -> find_PassageAttention",
            ]
        );
    }

    #[test]
    fn test_round_trip_for_every_program_shape() {
        let grammar = DropGrammar::new();
        let forms = [
            DATE_COMPARE_LF,
            "(find_passageSpanAnswer find_PassageAttention)",
            "find_questionSpanAnswer",
            "(year_difference find_PassageAttention find_PassageAttention)",
            "(find_passageSpanAnswer (compare_num_lesser_than find_PassageAttention (compare_date_lesser_than find_PassageAttention find_PassageAttention)))",
        ];
        for lf in forms {
            let actions = grammar.logical_form_to_action_sequence(lf).unwrap();
            assert_eq!(grammar.action_sequence_to_logical_form(&actions).unwrap(), lf);
        }
    }

    #[test]
    fn test_whitespace_is_normalised() {
        let grammar = DropGrammar::new();
        let messy   = "  ( find_passageSpanAnswer\n  find_PassageAttention )";
        let actions = grammar.logical_form_to_action_sequence(messy).unwrap();
        assert_eq!(
            grammar.action_sequence_to_logical_form(&actions).unwrap(),
            "(find_passageSpanAnswer find_PassageAttention)"
        );
    }

    #[test]
    fn test_type_errors_are_rejected() {
        let grammar = DropGrammar::new();
        // find_passageSpanAnswer needs an attention, not a span answer
        let bad = "(find_passageSpanAnswer find_questionSpanAnswer)";
        assert!(matches!(
            grammar.logical_form_to_action_sequence(bad),
            Err(LanguageError::InvalidLogicalForm { .. })
        ));
        // an attention alone is not a program result
        assert!(grammar.logical_form_to_action_sequence("find_PassageAttention").is_err());
        assert!(grammar.logical_form_to_action_sequence("(find_passageSpanAnswer").is_err());
    }

    #[test]
    fn test_incomplete_and_trailing_sequences_are_malformed() {
        let grammar = DropGrammar::new();
        let incomplete: Vec<String> = vec![
            "@start@ -> PassageSpanAnswer".into(),
            "PassageSpanAnswer -> find_passageSpanAnswer".into(),
        ];
        assert!(matches!(
            grammar.parse_actions(&incomplete),
            Err(LanguageError::MalformedProgram { .. })
        ));

        let trailing: Vec<String> = vec![
            "@start@ -> QuestionSpanAnswer".into(),
            "QuestionSpanAnswer -> find_questionSpanAnswer".into(),
            "PassageAttention -> find_PassageAttention".into(),
        ];
        assert!(matches!(
            grammar.parse_actions(&trailing),
            Err(LanguageError::MalformedProgram { .. })
        ));
    }

    #[test]
    fn test_action_indices_follow_preorder() {
        let grammar = DropGrammar::new();
        let program = grammar.parse_logical_form(DATE_COMPARE_LF).unwrap();
        assert_eq!(program.root.action_index, 1);
        let compare = &program.root.args[0];
        assert_eq!(compare.action_index, 2);
        assert_eq!(compare.args[0].action_index, 3);
        assert_eq!(compare.args[1].action_index, 4);
    }
}
