use chrono::{DateTime, Utc};
use tracing::trace;
use uuid::Uuid;

use crate::status::{Status, classify_for_display};
use crate::task::Task;

#[derive(Debug, Clone)]
pub enum Pred {
    Id(Uuid),
    IdPrefix(String),
    AssigneeEq(String),
    DepartmentEq(String),
    StatusEq(Status),
    VirtualTagInclude(VirtualTag),
    VirtualTagExclude(VirtualTag),
    TextContains(String),
}

#[derive(Debug, Clone, Copy)]
pub enum VirtualTag {
    Overdue,
    Editable,
}

#[derive(Debug, Clone)]
enum Expr {
    True,
    Pred(Pred),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// Local filter over fetched task lists. The backend is never asked to
/// filter; this evaluates entirely in memory, like the dropdown filters of
/// the admin screen it replaces.
#[derive(Debug, Clone)]
pub struct Filter {
    expr: Expr,
}

impl Default for Filter {
    fn default() -> Self {
        Self { expr: Expr::True }
    }
}

impl Filter {
    #[tracing::instrument(skip(terms))]
    pub fn parse(terms: &[String]) -> anyhow::Result<Self> {
        if terms.is_empty() {
            return Ok(Self::default());
        }

        let tokens = lex_terms(terms);
        let mut parser = Parser::new(tokens);
        let expr = parser.parse_expr()?;
        parser.ensure_end()?;

        Ok(Self { expr })
    }

    pub fn matches(&self, task: &Task, now: DateTime<Utc>) -> bool {
        let ok = eval_expr(&self.expr, task, now);
        trace!(task = %task.id, ok, "filter evaluated");
        ok
    }
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<String>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> anyhow::Result<Expr> {
        let mut nodes = vec![self.parse_and()?];

        while self.match_any(&["or", "||"]) {
            nodes.push(self.parse_and()?);
        }

        if nodes.len() == 1 {
            Ok(nodes.remove(0))
        } else {
            Ok(Expr::Or(nodes))
        }
    }

    fn parse_and(&mut self) -> anyhow::Result<Expr> {
        let mut nodes = vec![self.parse_primary()?];

        loop {
            if self.match_any(&["and", "&&"]) {
                nodes.push(self.parse_primary()?);
                continue;
            }

            if self.peek_is_implicit_and_boundary() {
                nodes.push(self.parse_primary()?);
                continue;
            }

            break;
        }

        if nodes.len() == 1 {
            Ok(nodes.remove(0))
        } else {
            Ok(Expr::And(nodes))
        }
    }

    fn parse_primary(&mut self) -> anyhow::Result<Expr> {
        if self.match_token("(") {
            let inner = self.parse_expr()?;
            self.expect_token(")")?;
            return Ok(inner);
        }

        let token = self
            .next_token()
            .ok_or_else(|| anyhow::anyhow!("unexpected end of filter expression"))?;

        if token == ")" {
            return Err(anyhow::anyhow!("unexpected ')' in filter expression"));
        }

        let pred = parse_atom(&token)?;
        Ok(Expr::Pred(pred))
    }

    fn ensure_end(&self) -> anyhow::Result<()> {
        if self.pos < self.tokens.len() {
            Err(anyhow::anyhow!(
                "unexpected token in filter expression: {}",
                self.tokens[self.pos]
            ))
        } else {
            Ok(())
        }
    }

    fn match_token(&mut self, expected: &str) -> bool {
        let Some(tok) = self.tokens.get(self.pos) else {
            return false;
        };
        if tok.eq_ignore_ascii_case(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn match_any(&mut self, options: &[&str]) -> bool {
        options.iter().any(|opt| self.match_token(opt))
    }

    fn expect_token(&mut self, expected: &str) -> anyhow::Result<()> {
        if self.match_token(expected) {
            Ok(())
        } else {
            Err(anyhow::anyhow!("expected '{expected}' in filter expression"))
        }
    }

    fn next_token(&mut self) -> Option<String> {
        let out = self.tokens.get(self.pos).cloned();
        if out.is_some() {
            self.pos += 1;
        }
        out
    }

    fn peek_is_implicit_and_boundary(&self) -> bool {
        let Some(tok) = self.tokens.get(self.pos) else {
            return false;
        };

        if tok.eq_ignore_ascii_case("and") || tok.eq_ignore_ascii_case("&&") {
            return false;
        }

        !tok.eq_ignore_ascii_case("or")
            && !tok.eq_ignore_ascii_case("||")
            && !tok.eq_ignore_ascii_case(")")
    }
}

fn lex_terms(terms: &[String]) -> Vec<String> {
    let mut out = Vec::new();

    for term in terms {
        let mut current = String::new();
        for ch in term.chars() {
            if ch == '(' || ch == ')' {
                if !current.is_empty() {
                    out.push(current.clone());
                    current.clear();
                }
                out.push(ch.to_string());
            } else {
                current.push(ch);
            }
        }

        if !current.is_empty() {
            out.push(current);
        }
    }

    out
}

fn parse_atom(term: &str) -> anyhow::Result<Pred> {
    if let Some(tag) = term.strip_prefix('+') {
        if let Some(virtual_tag) = parse_virtual_tag(tag) {
            return Ok(Pred::VirtualTagInclude(virtual_tag));
        }
        return Err(anyhow::anyhow!("unknown virtual tag: +{tag}"));
    }
    if let Some(tag) = term.strip_prefix('-') {
        if let Some(virtual_tag) = parse_virtual_tag(tag) {
            return Ok(Pred::VirtualTagExclude(virtual_tag));
        }
        return Err(anyhow::anyhow!("unknown virtual tag: -{tag}"));
    }

    if let Ok(uuid) = Uuid::parse_str(term) {
        return Ok(Pred::Id(uuid));
    }

    if let Some(prefix) = term.strip_prefix("id:") {
        return Ok(Pred::IdPrefix(prefix.to_ascii_lowercase()));
    }

    if let Some(name) = term.strip_prefix("dept:") {
        return Ok(Pred::DepartmentEq(name.to_string()));
    }

    if let Some(name) = term.strip_prefix("to:") {
        return Ok(Pred::AssigneeEq(name.to_string()));
    }

    if let Some(status_text) = term.strip_prefix("status:") {
        return Ok(match Status::from_wire(status_text) {
            Some(status) => Pred::StatusEq(status),
            None => Pred::TextContains(term.to_string()),
        });
    }

    Ok(Pred::TextContains(term.to_string()))
}

fn parse_virtual_tag(tag: &str) -> Option<VirtualTag> {
    match tag.to_ascii_lowercase().as_str() {
        "overdue" => Some(VirtualTag::Overdue),
        "editable" => Some(VirtualTag::Editable),
        _ => None,
    }
}

fn eval_expr(expr: &Expr, task: &Task, now: DateTime<Utc>) -> bool {
    match expr {
        Expr::True => true,
        Expr::Pred(pred) => eval_pred(pred, task, now),
        Expr::And(nodes) => nodes.iter().all(|node| eval_expr(node, task, now)),
        Expr::Or(nodes) => nodes.iter().any(|node| eval_expr(node, task, now)),
    }
}

fn eval_pred(pred: &Pred, task: &Task, now: DateTime<Utc>) -> bool {
    match pred {
        Pred::Id(id) => task.id == *id,
        Pred::IdPrefix(prefix) => task.id.to_string().starts_with(prefix.as_str()),
        Pred::AssigneeEq(name) => task.assigned_to.as_ref().is_some_and(|assignee| {
            assignee.name.eq_ignore_ascii_case(name)
                || assignee
                    .email
                    .as_deref()
                    .is_some_and(|email| email.eq_ignore_ascii_case(name))
        }),
        Pred::DepartmentEq(name) => task.department_name().eq_ignore_ascii_case(name),
        Pred::StatusEq(status) => Status::from_wire(&task.status) == Some(*status),
        Pred::VirtualTagInclude(tag) => eval_virtual_tag(*tag, task, now),
        Pred::VirtualTagExclude(tag) => !eval_virtual_tag(*tag, task, now),
        Pred::TextContains(text) => {
            let needle = text.to_ascii_lowercase();
            task.title.to_ascii_lowercase().contains(&needle)
                || task.description.to_ascii_lowercase().contains(&needle)
        }
    }
}

fn eval_virtual_tag(tag: VirtualTag, task: &Task, now: DateTime<Utc>) -> bool {
    match tag {
        // A finished task is never "overdue"; the deadline comparison only
        // matters while the task can still be acted on.
        VirtualTag::Overdue => {
            task.is_overdue(now) && classify_for_display(&task.status).editable
        }
        VirtualTag::Editable => classify_for_display(&task.status).editable,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::Filter;
    use crate::org::DepartmentRef;
    use crate::task::{Assignee, Task};

    fn sample_task(title: &str, status: &str, assignee: &str, department: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            deadline: Utc.with_ymd_and_hms(2025, 6, 30, 17, 0, 0).unwrap(),
            status: status.to_string(),
            logs: vec![],
            assigned_to: Some(Assignee {
                id: Uuid::new_v4(),
                name: assignee.to_string(),
                email: None,
                department: Some(DepartmentRef {
                    id: Uuid::new_v4(),
                    name: department.to_string(),
                }),
            }),
            assigned_by: None,
        }
    }

    fn terms(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn department_and_assignee_atoms_match_case_insensitively() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let task = sample_task("Audit ledgers", "active", "Jane Doe", "Finance");

        let filter = Filter::parse(&terms(&["dept:finance"])).expect("parse");
        assert!(filter.matches(&task, now));

        let filter = Filter::parse(&terms(&["to:jane doe"])).expect("parse");
        assert!(filter.matches(&task, now));

        let filter = Filter::parse(&terms(&["dept:Engineering"])).expect("parse");
        assert!(!filter.matches(&task, now));
    }

    #[test]
    fn boolean_precedence_and_parentheses() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let finance = sample_task("a", "active", "Jane", "Finance");
        let support = sample_task("b", "active", "Omar", "Support");
        let finance_omar = sample_task("c", "active", "Omar", "Finance");

        let filter = Filter::parse(&terms(&[
            "(", "dept:Finance", "or", "dept:Support", ")", "and", "to:Omar",
        ]))
        .expect("parse");

        assert!(!filter.matches(&finance, now));
        assert!(filter.matches(&support, now));
        assert!(filter.matches(&finance_omar, now));
    }

    #[test]
    fn status_atom_normalizes_spelling() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let done = sample_task("d", "COMPLETED", "Jane", "Finance");

        let filter = Filter::parse(&terms(&["status:complete"])).expect("parse");
        assert!(filter.matches(&done, now));
    }

    #[test]
    fn overdue_ignores_finished_tasks() {
        let late = Utc.with_ymd_and_hms(2025, 7, 15, 0, 0, 0).unwrap();
        let open = sample_task("open", "active", "Jane", "Finance");
        let done = sample_task("done", "complete", "Jane", "Finance");

        let filter = Filter::parse(&terms(&["+overdue"])).expect("parse");
        assert!(filter.matches(&open, late));
        assert!(!filter.matches(&done, late));

        let before = open.deadline - Duration::hours(1);
        assert!(!filter.matches(&open, before));
    }

    #[test]
    fn id_prefix_selects_single_task() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let task = sample_task("a", "active", "Jane", "Finance");
        let prefix = task.id.to_string()[..8].to_string();

        let filter = Filter::parse(&[format!("id:{prefix}")]).expect("parse");
        assert!(filter.matches(&task, now));
    }

    #[test]
    fn unknown_virtual_tag_is_rejected() {
        assert!(Filter::parse(&terms(&["+urgent"])).is_err());
    }
}
