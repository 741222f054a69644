// ============================================================
// Layer 3b — Program Executor
// ============================================================
// Executes a program against one instance's encoded context.
//
//   action sequence ──parse──▶ Program tree ──eval──▶ Denotation
//                                  │
//                     side-args aligned by action index
//
// Intermediate values are passage attentions (a distribution over
// passage tokens plus the auxiliary loss accumulated below them).
// Date and number comparisons project attentions onto passage
// entities through the token → entity alignment, then read
// P(e1 < e2) and P(e1 > e2) off a host-built 0/1 matrix in which
// every pair touching an unknown value is zero.

use burn::prelude::*;
use tracing::debug;

use crate::domain::date::{is_known_number, Date};
use crate::language::denotation::{
    Denotation, DenotationValue, INVALID_YEAR_BUCKET, MAX_YEAR_DIFFERENCE,
    YEAR_DIFFERENCE_BUCKETS,
};
use crate::language::error::LanguageError;
use crate::language::grammar::{DropGrammar, Program, ProgramNode};
use crate::language::side_args::{Grounding, SideArgs};
use crate::language::types::Function;
use crate::ml::util;

/// Added to the probability mass in the auxiliary losses.
const AUX_EPS: f32 = 1e-3;
/// Added to attentions before taking logs for span logits.
const SPAN_EPS: f32 = 1e-6;

// ─── DropContext ──────────────────────────────────────────────────────────────
/// The encoded instance a program runs against.
#[derive(Debug, Clone)]
pub struct DropContext<B: Backend> {
    /// [question_len, dim]
    pub question_encoding: Tensor<B, 2>,
    /// [passage_len, dim]
    pub passage_encoding:  Tensor<B, 2>,
    pub question_mask:     Vec<bool>,
    pub passage_mask:      Vec<bool>,
    pub passage_dates:           Vec<Date>,
    pub passage_token_to_date:   Vec<i64>,
    pub passage_numbers:         Vec<f64>,
    pub passage_token_to_number: Vec<i64>,
}

impl<B: Backend> DropContext<B> {
    pub fn question_len(&self) -> usize {
        self.question_mask.len()
    }

    pub fn passage_len(&self) -> usize {
        self.passage_mask.len()
    }

    pub fn device(&self) -> B::Device {
        self.passage_encoding.device()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Date,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Lesser,
    Greater,
}

/// Host-side tables for one entity kind.
#[derive(Debug, Clone)]
struct EntityTables<B: Backend> {
    count:     usize,
    /// [passage_len, count], 1 where a token mentions the entity
    alignment: Option<Tensor<B, 2>>,
    /// [count, count], 1 where entity i < entity j
    lesser:    Option<Tensor<B, 2>>,
    greater:   Option<Tensor<B, 2>>,
}

impl<B: Backend> EntityTables<B> {
    fn build(
        token_to_entity: &[i64],
        passage_len:     usize,
        count:           usize,
        less:            impl Fn(usize, usize) -> bool,
        more:            impl Fn(usize, usize) -> bool,
        device:          &B::Device,
    ) -> Self {
        if count == 0 {
            return Self { count, alignment: None, lesser: None, greater: None };
        }

        let mut alignment = vec![0.0f32; passage_len * count];
        for (token, &entity) in token_to_entity.iter().enumerate().take(passage_len) {
            if entity >= 0 && (entity as usize) < count {
                alignment[token * count + entity as usize] = 1.0;
            }
        }

        let mut lesser  = vec![0.0f32; count * count];
        let mut greater = vec![0.0f32; count * count];
        for i in 0..count {
            for j in 0..count {
                if less(i, j) {
                    lesser[i * count + j] = 1.0;
                }
                if more(i, j) {
                    greater[i * count + j] = 1.0;
                }
            }
        }

        Self {
            count,
            alignment: Some(util::matrix(alignment, passage_len, count, device)),
            lesser:    Some(util::matrix(lesser, count, count, device)),
            greater:   Some(util::matrix(greater, count, count, device)),
        }
    }
}

#[derive(Debug, Clone)]
struct Attention<B: Backend> {
    values: Tensor<B, 1>,
    loss:   Tensor<B, 1>,
}

enum Evaluated<B: Backend> {
    Attention(Attention<B>),
    Answer(Denotation<B>),
}

// ─── DropLanguage ─────────────────────────────────────────────────────────────
/// The executable language bound to one instance.
#[derive(Debug, Clone)]
pub struct DropLanguage<B: Backend> {
    grammar: DropGrammar,
    context: DropContext<B>,
    dates:   EntityTables<B>,
    numbers: EntityTables<B>,
    /// [pairs of dates, YEAR_DIFFERENCE_BUCKETS]
    year_buckets: Option<Tensor<B, 2>>,
}

impl<B: Backend> DropLanguage<B> {
    pub fn new(grammar: DropGrammar, context: DropContext<B>) -> Self {
        let device      = context.device();
        let passage_len = context.passage_len();

        let dates_v = &context.passage_dates;
        let dates = EntityTables::build(
            &context.passage_token_to_date,
            passage_len,
            dates_v.len(),
            |i, j| dates_v[i].is_before(&dates_v[j]),
            |i, j| dates_v[i].is_after(&dates_v[j]),
            &device,
        );

        let nums = &context.passage_numbers;
        let known = |i: usize, j: usize| is_known_number(nums[i]) && is_known_number(nums[j]);
        let numbers = EntityTables::build(
            &context.passage_token_to_number,
            passage_len,
            nums.len(),
            |i, j| known(i, j) && nums[i] < nums[j],
            |i, j| known(i, j) && nums[i] > nums[j],
            &device,
        );

        let year_buckets = year_bucket_matrix(dates_v, &device);

        Self { grammar, context, dates, numbers, year_buckets }
    }

    pub fn grammar(&self) -> &DropGrammar {
        &self.grammar
    }

    pub fn context(&self) -> &DropContext<B> {
        &self.context
    }

    pub fn all_possible_productions(&self) -> Vec<String> {
        self.grammar.all_possible_productions()
    }

    /// Execute an action sequence with its aligned side-args.
    /// `side_args` may be shorter than `actions`; missing entries are empty.
    pub fn execute(
        &self,
        actions:   &[String],
        side_args: &[SideArgs<B>],
    ) -> Result<Denotation<B>, LanguageError> {
        let program = self.grammar.parse_actions(actions)?;
        self.execute_program(&program, side_args)
    }

    pub fn execute_program(
        &self,
        program:   &Program,
        side_args: &[SideArgs<B>],
    ) -> Result<Denotation<B>, LanguageError> {
        match self.eval(&program.root, side_args)? {
            Evaluated::Answer(denotation) => Ok(denotation),
            Evaluated::Attention(_) => Err(LanguageError::malformed(
                "program evaluates to an attention, not an answer",
            )),
        }
    }

    fn eval(
        &self,
        node:      &ProgramNode,
        side_args: &[SideArgs<B>],
    ) -> Result<Evaluated<B>, LanguageError> {
        let empty = SideArgs::default();
        let side  = side_args.get(node.action_index).unwrap_or(&empty);

        let evaluated = match node.function {
            Function::FindPassageAttention => {
                Evaluated::Attention(self.find_passage_attention(side.question_attention.as_ref())?)
            }
            Function::FindPassageSpanAnswer => {
                let [attention] = self.attention_args::<1>(node, side_args)?;
                Evaluated::Answer(self.passage_span_answer(attention, side.passage_attention.as_ref())?)
            }
            Function::FindQuestionSpanAnswer => {
                Evaluated::Answer(self.question_span_answer(side.question_attention.as_ref())?)
            }
            Function::CompareDateLesserThan
            | Function::CompareDateGreaterThan
            | Function::CompareNumLesserThan
            | Function::CompareNumGreaterThan => {
                let [first, second] = self.attention_args::<2>(node, side_args)?;
                let (kind, direction) = match node.function {
                    Function::CompareDateLesserThan  => (EntityKind::Date, Direction::Lesser),
                    Function::CompareDateGreaterThan => (EntityKind::Date, Direction::Greater),
                    Function::CompareNumLesserThan   => (EntityKind::Number, Direction::Lesser),
                    _                                => (EntityKind::Number, Direction::Greater),
                };
                Evaluated::Attention(self.compare(kind, direction, first, second, side.groundings.as_ref()))
            }
            Function::YearDifference => {
                let [first, second] = self.attention_args::<2>(node, side_args)?;
                Evaluated::Answer(self.year_difference(first, second, side.groundings.as_ref()))
            }
        };

        Ok(evaluated)
    }

    fn attention_args<const N: usize>(
        &self,
        node:      &ProgramNode,
        side_args: &[SideArgs<B>],
    ) -> Result<[Attention<B>; N], LanguageError> {
        let mut attentions = Vec::with_capacity(N);
        for arg in &node.args {
            match self.eval(arg, side_args)? {
                Evaluated::Attention(attention) => attentions.push(attention),
                Evaluated::Answer(_) => {
                    return Err(LanguageError::malformed(format!(
                        "{} expects attention arguments",
                        node.function
                    )))
                }
            }
        }
        let found = attentions.len();
        attentions.try_into().map_err(|_| {
            LanguageError::malformed(format!("{} expects {N} argument(s), got {found}", node.function))
        })
    }

    // ─── Operations ───────────────────────────────────────────────────────────

    fn find_passage_attention(
        &self,
        question_attention: Option<&Tensor<B, 1>>,
    ) -> Result<Attention<B>, LanguageError> {
        let device = self.context.device();
        let q_att  = match question_attention {
            Some(att) => self.checked(att, self.context.question_len(), "question attention")?,
            None      => uniform(&self.context.question_mask, &device),
        };

        let [passage_len, dim] = self.context.passage_encoding.dims();
        let q_vec  = q_att.unsqueeze::<2>().matmul(self.context.question_encoding.clone());
        let scores = self
            .context
            .passage_encoding
            .clone()
            .matmul(q_vec.transpose())
            .reshape([passage_len])
            .div_scalar((dim.max(1) as f32).sqrt());

        Ok(Attention {
            values: util::masked_softmax(scores, &self.context.passage_mask),
            loss:   util::scalar(0.0, &device),
        })
    }

    fn passage_span_answer(
        &self,
        attention:      Attention<B>,
        gold_attention: Option<&Tensor<B, 1>>,
    ) -> Result<Denotation<B>, LanguageError> {
        let values = match gold_attention {
            Some(gold) => self.checked(gold, self.context.passage_len(), "passage attention")?,
            None       => attention.values,
        };
        let (start_logits, end_logits) = span_logits(values, &self.context.passage_mask);
        Ok(Denotation {
            value: DenotationValue::PassageSpanAnswer { start_logits, end_logits },
            loss:  attention.loss,
        })
    }

    fn question_span_answer(
        &self,
        question_attention: Option<&Tensor<B, 1>>,
    ) -> Result<Denotation<B>, LanguageError> {
        let device = self.context.device();
        let values = match question_attention {
            Some(att) => self.checked(att, self.context.question_len(), "question attention")?,
            None      => uniform(&self.context.question_mask, &device),
        };
        let (start_logits, end_logits) = span_logits(values, &self.context.question_mask);
        Ok(Denotation {
            value: DenotationValue::QuestionSpanAnswer { start_logits, end_logits },
            loss:  util::scalar(0.0, &device),
        })
    }

    fn compare(
        &self,
        kind:       EntityKind,
        direction:  Direction,
        first:      Attention<B>,
        second:     Attention<B>,
        groundings: Option<&Grounding<B>>,
    ) -> Attention<B> {
        let device = self.context.device();
        let tables = match kind {
            EntityKind::Date   => &self.dates,
            EntityKind::Number => &self.numbers,
        };

        let (p_lesser, p_greater) = match self.event_distributions(tables, &first, &second, groundings) {
            Some((d1, d2)) => match (&tables.lesser, &tables.greater) {
                (Some(lesser), Some(greater)) => (
                    bilinear(d1.clone(), lesser.clone(), d2.clone()),
                    bilinear(d1, greater.clone(), d2),
                ),
                _ => (util::scalar(0.0, &device), util::scalar(0.0, &device)),
            },
            None => (util::scalar(0.0, &device), util::scalar(0.0, &device)),
        };

        let (w_first, w_second) = match direction {
            Direction::Lesser  => (p_lesser.clone(), p_greater.clone()),
            Direction::Greater => (p_greater.clone(), p_lesser.clone()),
        };
        let values = first.values.mul(w_first).add(second.values.mul(w_second));

        let comparable = p_lesser.add(p_greater).add_scalar(AUX_EPS).log().neg();
        Attention { values, loss: first.loss.add(second.loss).add(comparable) }
    }

    fn year_difference(
        &self,
        first:      Attention<B>,
        second:     Attention<B>,
        groundings: Option<&Grounding<B>>,
    ) -> Denotation<B> {
        let device  = self.context.device();
        let invalid = one_hot_invalid::<B>(&device);
        let count   = self.dates.count;

        let distribution = match (self.event_distributions(&self.dates, &first, &second, groundings), &self.year_buckets) {
            (Some((d1, d2)), Some(buckets)) => {
                let joint = d1
                    .unsqueeze_dim::<2>(1)
                    .matmul(d2.unsqueeze::<2>())
                    .reshape([1, count * count]);
                let distribution = joint.matmul(buckets.clone()).reshape([YEAR_DIFFERENCE_BUCKETS]);
                // mass not on any date pair counts as invalid
                let leftover = distribution.clone().sum().neg().add_scalar(1.0);
                distribution.add(invalid.mul(leftover))
            }
            _ => invalid,
        };

        let p_invalid = distribution
            .clone()
            .slice([INVALID_YEAR_BUCKET..INVALID_YEAR_BUCKET + 1]);
        let valid_loss = p_invalid.neg().add_scalar(1.0 + AUX_EPS).log().neg();

        Denotation {
            value: DenotationValue::YearDifference { distribution },
            loss:  first.loss.add(second.loss).add(valid_loss),
        }
    }

    // ─── Helpers ──────────────────────────────────────────────────────────────

    /// Distributions over entities for the two events, preferring
    /// injected groundings when their length matches.
    fn event_distributions(
        &self,
        tables:     &EntityTables<B>,
        first:      &Attention<B>,
        second:     &Attention<B>,
        groundings: Option<&Grounding<B>>,
    ) -> Option<(Tensor<B, 1>, Tensor<B, 1>)> {
        let alignment = tables.alignment.as_ref()?;

        if let Some(g) = groundings {
            let [n1] = g.first.dims();
            let [n2] = g.second.dims();
            if n1 == tables.count && n2 == tables.count {
                return Some((util::normalise(g.first.clone()), util::normalise(g.second.clone())));
            }
            debug!(expected = tables.count, n1, n2, "Ignoring groundings of mismatched length");
        }

        let project = |att: &Tensor<B, 1>| {
            let projected = att
                .clone()
                .unsqueeze::<2>()
                .matmul(alignment.clone())
                .reshape([tables.count]);
            util::normalise(projected)
        };
        Some((project(&first.values), project(&second.values)))
    }

    fn checked(
        &self,
        tensor: &Tensor<B, 1>,
        len:    usize,
        what:   &str,
    ) -> Result<Tensor<B, 1>, LanguageError> {
        let [got] = tensor.dims();
        if got != len {
            return Err(LanguageError::malformed(format!(
                "{what} has length {got}, expected {len}"
            )));
        }
        Ok(tensor.clone())
    }
}

/// Uniform distribution over the unmasked positions.
fn uniform<B: Backend>(mask: &[bool], device: &B::Device) -> Tensor<B, 1> {
    let kept   = mask.iter().filter(|k| **k).count().max(1) as f32;
    let values = mask.iter().map(|&k| if k { 1.0 / kept } else { 0.0 }).collect();
    util::vector(values, device)
}

fn one_hot_invalid<B: Backend>(device: &B::Device) -> Tensor<B, 1> {
    let mut values = vec![0.0f32; YEAR_DIFFERENCE_BUCKETS];
    values[INVALID_YEAR_BUCKET] = 1.0;
    util::vector(values, device)
}

/// `first^T · matrix · second`, shape [1].
fn bilinear<B: Backend>(first: Tensor<B, 1>, matrix: Tensor<B, 2>, second: Tensor<B, 1>) -> Tensor<B, 1> {
    let [n] = first.dims();
    let row = first.unsqueeze::<2>().matmul(matrix).reshape([n]);
    util::dot(row, second)
}

/// One-hot bucket of every ordered date pair, flattened row-major.
fn year_bucket_matrix<B: Backend>(dates: &[Date], device: &B::Device) -> Option<Tensor<B, 2>> {
    if dates.is_empty() {
        return None;
    }
    let pairs = dates.len() * dates.len();
    let mut values = vec![0.0f32; pairs * YEAR_DIFFERENCE_BUCKETS];
    for (i, a) in dates.iter().enumerate() {
        for (j, b) in dates.iter().enumerate() {
            let bucket = match a.year_difference(b) {
                Some(gap) if gap <= MAX_YEAR_DIFFERENCE as i64 => gap as usize,
                _ => INVALID_YEAR_BUCKET,
            };
            values[(i * dates.len() + j) * YEAR_DIFFERENCE_BUCKETS + bucket] = 1.0;
        }
    }
    Some(util::matrix(values, pairs, YEAR_DIFFERENCE_BUCKETS, device))
}

/// Start/end logits from an attention: a token scores high as a
/// start when it is attended and its left neighbour is not, and
/// symmetrically for ends. Masked positions get MASK_FILL.
fn span_logits<B: Backend>(attention: Tensor<B, 1>, mask: &[bool]) -> (Tensor<B, 1>, Tensor<B, 1>) {
    let device  = attention.device();
    let [len]   = attention.dims();
    let log_att = attention.add_scalar(SPAN_EPS).log();
    let floor   = util::scalar::<B>(SPAN_EPS.ln(), &device);

    let (prev, next) = if len <= 1 {
        (floor.clone(), floor)
    } else {
        (
            Tensor::cat(vec![floor.clone(), log_att.clone().slice([0..len - 1])], 0),
            Tensor::cat(vec![log_att.clone().slice([1..len]), floor], 0),
        )
    };

    let start = log_att.clone().add(log_att.clone().sub(prev));
    let end   = log_att.clone().add(log_att.sub(next));
    (util::mask_logits(start, mask), util::mask_logits(end, mask))
}
