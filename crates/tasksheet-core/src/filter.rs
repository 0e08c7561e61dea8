use chrono::{
  Days,
  NaiveDate
};
use tracing::trace;

use crate::cell::CellValue;
use crate::datetime::to_calendar_date;
use crate::occurrence::Occurrence;
use crate::task::Frequency;

#[derive(Debug, Clone, PartialEq)]
pub enum Pred {
  Id(String),
  FrequencyEq(Frequency),
  AssigneeEq(String),
  Before(NaiveDate),
  After(NaiveDate),
  On(NaiveDate),
  TextContains(String)
}

#[derive(Debug, Clone)]
enum Expr {
  True,
  Pred(Pred),
  And(Vec<Expr>),
  Or(Vec<Expr>)
}

#[derive(Debug, Clone)]
pub struct Filter {
  expr: Expr
}

impl Default for Filter {
  fn default() -> Self {
    Self {
      expr: Expr::True
    }
  }
}

impl Filter {
  #[tracing::instrument(skip(
    terms, today
  ))]
  pub fn parse(
    terms: &[String],
    today: NaiveDate
  ) -> anyhow::Result<Self> {
    if terms.is_empty() {
      return Ok(Self::default());
    }

    let tokens = lex_terms(terms);
    let mut parser =
      Parser::new(tokens, today);
    let expr = parser.parse_expr()?;
    parser.ensure_end()?;

    trace!(?expr, "parsed filter");
    Ok(Self {
      expr
    })
  }

  pub fn matches(
    &self,
    occ: &Occurrence<'_>
  ) -> bool {
    eval_expr(&self.expr, occ)
  }

  pub fn is_empty(&self) -> bool {
    matches!(self.expr, Expr::True)
  }
}

struct Parser {
  tokens: Vec<String>,
  pos:    usize,
  today:  NaiveDate
}

impl Parser {
  fn new(
    tokens: Vec<String>,
    today: NaiveDate
  ) -> Self {
    Self {
      tokens,
      pos: 0,
      today
    }
  }

  fn parse_expr(
    &mut self
  ) -> anyhow::Result<Expr> {
    self.parse_or()
  }

  fn parse_or(
    &mut self
  ) -> anyhow::Result<Expr> {
    let mut nodes =
      vec![self.parse_and()?];

    while self.match_any(&["or", "||"])
    {
      nodes.push(self.parse_and()?);
    }

    if nodes.len() == 1 {
      Ok(nodes.remove(0))
    } else {
      Ok(Expr::Or(nodes))
    }
  }

  fn parse_and(
    &mut self
  ) -> anyhow::Result<Expr> {
    let mut nodes =
      vec![self.parse_primary()?];

    loop {
      if self.match_any(&["and", "&&"])
      {
        nodes
          .push(self.parse_primary()?);
        continue;
      }

      if self
        .peek_is_implicit_and_boundary()
      {
        nodes
          .push(self.parse_primary()?);
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

  fn parse_primary(
    &mut self
  ) -> anyhow::Result<Expr> {
    if self.match_token("(") {
      let inner = self.parse_expr()?;
      self.expect_token(")")?;
      return Ok(inner);
    }

    let token = self
      .next_token()
      .ok_or_else(|| {
        anyhow::anyhow!(
          "unexpected end of filter \
           expression"
        )
      })?;

    if token == ")" {
      return Err(anyhow::anyhow!(
        "unexpected ')' in filter \
         expression"
      ));
    }

    let pred =
      parse_atom(&token, self.today)?;
    Ok(Expr::Pred(pred))
  }

  fn ensure_end(
    &self
  ) -> anyhow::Result<()> {
    if self.pos < self.tokens.len() {
      Err(anyhow::anyhow!(
        "unexpected token in filter \
         expression: {}",
        self.tokens[self.pos]
      ))
    } else {
      Ok(())
    }
  }

  fn match_token(
    &mut self,
    expected: &str
  ) -> bool {
    let Some(tok) =
      self.tokens.get(self.pos)
    else {
      return false;
    };
    if tok
      .eq_ignore_ascii_case(expected)
    {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn match_any(
    &mut self,
    options: &[&str]
  ) -> bool {
    options
      .iter()
      .any(|opt| self.match_token(opt))
  }

  fn expect_token(
    &mut self,
    expected: &str
  ) -> anyhow::Result<()> {
    if self.match_token(expected) {
      Ok(())
    } else {
      Err(anyhow::anyhow!(
        "expected '{expected}' in \
         filter expression"
      ))
    }
  }

  fn next_token(
    &mut self
  ) -> Option<String> {
    let out = self
      .tokens
      .get(self.pos)
      .cloned();
    if out.is_some() {
      self.pos += 1;
    }
    out
  }

  fn peek_is_implicit_and_boundary(
    &self
  ) -> bool {
    let Some(tok) =
      self.tokens.get(self.pos)
    else {
      return false;
    };

    if tok.eq_ignore_ascii_case("and")
      || tok.eq_ignore_ascii_case("&&")
    {
      return false;
    }

    !tok.eq_ignore_ascii_case("or")
      && !tok.eq_ignore_ascii_case("||")
      && !tok.eq_ignore_ascii_case(")")
  }
}

fn lex_terms(
  terms: &[String]
) -> Vec<String> {
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

fn parse_atom(
  term: &str,
  today: NaiveDate
) -> anyhow::Result<Pred> {
  if let Some(id) =
    term.strip_prefix("id:")
  {
    return Ok(Pred::Id(id.to_string()));
  }

  if let Some(label) =
    term.strip_prefix("freq:")
  {
    return Ok(Pred::FrequencyEq(
      Frequency::classify(label)
    ));
  }

  if let Some(name) =
    term.strip_prefix("assignee:")
  {
    return Ok(Pred::AssigneeEq(
      name.to_string()
    ));
  }

  if let Some(value) =
    term.strip_prefix("before:")
  {
    return Ok(Pred::Before(
      parse_filter_date(value, today)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("after:")
  {
    return Ok(Pred::After(
      parse_filter_date(value, today)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("on:")
  {
    return Ok(Pred::On(
      parse_filter_date(value, today)?
    ));
  }

  Ok(Pred::TextContains(
    term.to_string()
  ))
}

fn parse_filter_date(
  raw: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return today
        .checked_add_days(Days::new(1))
        .ok_or_else(|| {
          anyhow::anyhow!(
            "failed to advance to \
             tomorrow"
          )
        });
    }
    | _ => {}
  }

  to_calendar_date(&CellValue::from(
    raw
  ))
  .ok_or_else(|| {
    anyhow::anyhow!(
      "unrecognized date in filter: \
       {raw} (expected DD/MM/YYYY, \
       YYYY-MM-DD, today or tomorrow)"
    )
  })
}

fn eval_expr(
  expr: &Expr,
  occ: &Occurrence<'_>
) -> bool {
  match expr {
    | Expr::True => true,
    | Expr::Pred(pred) => {
      eval_pred(pred, occ)
    }
    | Expr::And(nodes) => {
      nodes
        .iter()
        .all(|node| eval_expr(node, occ))
    }
    | Expr::Or(nodes) => {
      nodes
        .iter()
        .any(|node| eval_expr(node, occ))
    }
  }
}

fn eval_pred(
  pred: &Pred,
  occ: &Occurrence<'_>
) -> bool {
  match pred {
    | Pred::Id(id) => {
      occ.task.id.eq_ignore_ascii_case(id)
    }
    | Pred::FrequencyEq(freq) => {
      occ.task.frequency == *freq
    }
    | Pred::AssigneeEq(name) => {
      occ
        .task
        .assignee
        .as_deref()
        .is_some_and(|assignee| {
          assignee
            .to_lowercase()
            .eq(&name.to_lowercase())
        })
    }
    | Pred::Before(day) => {
      occ.date < *day
    }
    | Pred::After(day) => occ.date > *day,
    | Pred::On(day) => occ.date == *day,
    | Pred::TextContains(text) => {
      occ
        .task
        .description
        .to_lowercase()
        .contains(&text.to_lowercase())
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::Filter;
  use crate::occurrence::Occurrence;
  use crate::task::{
    Frequency,
    RecurringTask
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn terms(raw: &[&str]) -> Vec<String> {
    raw
      .iter()
      .map(|s| s.to_string())
      .collect()
  }

  fn sample_tasks()
  -> (RecurringTask, RecurringTask) {
    let mut pump = RecurringTask::new(
      "MT-7",
      "Inspect pump seals",
      Some(ymd(2024, 6, 11)),
      Frequency::Weekly
    );
    pump.assignee =
      Some("Ravi".to_string());
    let mut cash = RecurringTask::new(
      "CL-3",
      "Count petty cash",
      Some(ymd(2024, 6, 11)),
      Frequency::Daily
    );
    cash.assignee =
      Some("Asha".to_string());
    (pump, cash)
  }

  #[test]
  fn boolean_precedence_and_parentheses()
  {
    let today = ymd(2024, 6, 10);
    let (pump, cash) = sample_tasks();
    let pump_occ = Occurrence {
      task: &pump,
      date: ymd(2024, 6, 11)
    };
    let cash_occ = Occurrence {
      task: &cash,
      date: ymd(2024, 6, 12)
    };

    let filter = Filter::parse(
      &terms(&[
        "(",
        "freq:weekly",
        "or",
        "assignee:asha",
        ")",
        "and",
        "after:11/06/2024"
      ]),
      today
    )
    .expect("parse filter");

    assert!(!filter.matches(&pump_occ));
    assert!(filter.matches(&cash_occ));
  }

  #[test]
  fn implicit_and_between_terms() {
    let today = ymd(2024, 6, 10);
    let (pump, _) = sample_tasks();
    let occ = Occurrence {
      task: &pump,
      date: ymd(2024, 6, 11)
    };

    let hit = Filter::parse(
      &terms(&["PUMP", "on:tomorrow"]),
      today
    )
    .expect("parse filter");
    assert!(hit.matches(&occ));

    let miss = Filter::parse(
      &terms(&["pump", "before:today"]),
      today
    )
    .expect("parse filter");
    assert!(!miss.matches(&occ));
  }

  #[test]
  fn id_match_ignores_case() {
    let today = ymd(2024, 6, 10);
    let (pump, _) = sample_tasks();
    let occ = Occurrence {
      task: &pump,
      date: ymd(2024, 6, 11)
    };
    let filter = Filter::parse(
      &terms(&["id:mt-7"]),
      today
    )
    .expect("parse filter");
    assert!(filter.matches(&occ));
  }

  #[test]
  fn bad_input_is_rejected() {
    let today = ymd(2024, 6, 10);
    assert!(
      Filter::parse(
        &terms(&["before:someday"]),
        today
      )
      .is_err()
    );
    assert!(
      Filter::parse(
        &terms(&["(", "pump"]),
        today
      )
      .is_err()
    );
    assert!(
      Filter::parse(&terms(&[")"]), today)
        .is_err()
    );
    assert!(
      Filter::parse(&[], today)
        .expect("empty filter")
        .is_empty()
    );
  }
}
