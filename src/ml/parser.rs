// ============================================================
// Layer 5 — DROP Parser Forward Pass
// ============================================================
// Runs one batch end to end:
//
//   Step 1: Encode every instance and bind it to a language
//   Step 2: Build the action vocabulary from the first instance
//   Step 3: Pick a search mode per instance
//             gold program known   → gold-sequence search
//             gold answers present → start types restricted
//             nothing supervisable → any start type
//   Step 4: Beam search, one run per mode
//   Step 5: Route gold side-args, execute, score
//   Step 6: Marginal likelihood + execution loss, predictions
//
// Programs that fail to execute are dropped with a warning; a
// batch never aborts because of a single program. The model loss
// is averaged over every instance in the batch, including those
// that contribute no likelihood term.

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::application::evaluate_use_case::ParserConfig;
use crate::domain::instance::{DropInstance, GoldAnswer};
use crate::language::executor::DropLanguage;
use crate::language::grammar::DropGrammar;
use crate::language::types::NodeType;
use crate::language::vocab::ActionVocab;
use crate::ml::answer::answer_string;
use crate::ml::cue_transition::LexicalCueTransition;
use crate::ml::encoder::HashingEncoder;
use crate::ml::mml::{
    denotation_log_likelihood, marginal_log_likelihood, program_log_probs,
    supervised_log_likelihood, BatchLoss, LossAccumulator, ProgramOutcome,
};
use crate::ml::util;
use crate::search::beam::{AllowedSequences, BeamSearch, FinishedStates, SearchConstraint};
use crate::search::grammar_state::GrammarStatelet;
use crate::search::state::SearchState;
use crate::supervision::gold::{gold_supervision, GoldProgramRegistry};
use crate::supervision::router::{route_side_args, GoldSupervision};

/// Start types an instance's gold answer can supervise.
pub fn infer_start_types(answer: &GoldAnswer) -> Vec<NodeType> {
    let mut types = Vec::new();
    if answer.has_passage_spans() {
        types.push(NodeType::PassageSpanAnswer);
    }
    if answer.has_question_spans() {
        types.push(NodeType::QuestionSpanAnswer);
    }
    if answer.has_year_differences() {
        types.push(NodeType::YearDifference);
    }
    types
}

/// Best program and answer for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub query_id:     String,
    /// Empty when no program could be executed
    pub logical_form: String,
    pub score:        Option<f32>,
    /// Probability of the best program among the instance's finished programs
    pub probability:  Option<f32>,
    pub answer:       String,
}

impl Prediction {
    fn empty(query_id: &str) -> Self {
        Self {
            query_id:     query_id.to_string(),
            logical_form: String::new(),
            score:        None,
            probability:  None,
            answer:       String::new(),
        }
    }
}

pub struct ParserOutput<B: Backend> {
    pub loss:        BatchLoss<B>,
    pub predictions: Vec<Prediction>,
    pub vocab:       ActionVocab,
}

/// How one instance is searched.
enum Supervision {
    GoldSequence(Vec<usize>),
    StartTypes(Vec<usize>),
}

pub struct DropParser {
    grammar:             DropGrammar,
    encoder:             HashingEncoder,
    search:              BeamSearch,
    registry:            GoldProgramRegistry,
    gold_programs:       bool,
    supervise_attention: bool,
}

impl DropParser {
    pub fn new(config: &ParserConfig) -> Self {
        let grammar  = DropGrammar::new();
        let registry = if config.gold_programs {
            GoldProgramRegistry::new(&grammar)
        } else {
            GoldProgramRegistry::empty()
        };
        Self {
            encoder:             HashingEncoder::new(config.encoder_dim, config.encoder_seed),
            search:              BeamSearch::new(config.search_config()),
            registry,
            grammar,
            gold_programs:       config.gold_programs,
            supervise_attention: config.supervise_attention,
        }
    }

    pub fn grammar(&self) -> &DropGrammar {
        &self.grammar
    }

    pub fn forward<B: Backend>(&self, instances: &[DropInstance], device: &B::Device) -> ParserOutput<B> {
        // ── Step 1: languages ────────────────────────────────────────────────
        let languages: Vec<DropLanguage<B>> = instances
            .iter()
            .map(|instance| DropLanguage::new(self.grammar.clone(), self.encoder.encode(instance, device)))
            .collect();

        // ── Step 2: action vocabulary (batch-invariant) ──────────────────────
        let vocab = ActionVocab::from(
            languages
                .first()
                .map(DropLanguage::all_possible_productions)
                .unwrap_or_else(|| self.grammar.all_possible_productions()),
        );

        // ── Step 3: search mode per instance ─────────────────────────────────
        let questions: Vec<Vec<String>> = instances.iter().map(DropInstance::lowercase_question_tokens).collect();
        let modes: Vec<Supervision> = instances
            .iter()
            .zip(&questions)
            .map(|(instance, tokens)| self.supervision_for(instance, tokens, &vocab))
            .collect();

        // ── Step 4: beam search ──────────────────────────────────────────────
        let table      = self.grammar.table();
        let transition = LexicalCueTransition::<B>::new(&table, &questions, device);
        let initial    = |index: usize| SearchState::initial(index, GrammarStatelet::new(table.clone()), (), device);

        let mut gold_sequences = Vec::with_capacity(modes.len());
        let mut start_ids      = Vec::with_capacity(modes.len());
        let mut gold_initial   = Vec::new();
        let mut free_initial   = Vec::new();
        for (index, mode) in modes.iter().enumerate() {
            match mode {
                Supervision::GoldSequence(ids) => {
                    gold_sequences.push(AllowedSequences::new(vec![ids.clone()]));
                    start_ids.push(BTreeSet::new());
                    gold_initial.push(initial(index));
                }
                Supervision::StartTypes(ids) => {
                    gold_sequences.push(AllowedSequences::default());
                    start_ids.push(ids.iter().copied().collect());
                    free_initial.push(initial(index));
                }
            }
        }

        let mut finished: FinishedStates<B, ()> = FinishedStates::new();
        if !gold_initial.is_empty() {
            finished.extend(self.search.search(
                gold_initial,
                &transition,
                &SearchConstraint::Sequences(gold_sequences),
            ));
        }
        if !free_initial.is_empty() {
            finished.extend(self.search.search(
                free_initial,
                &transition,
                &SearchConstraint::FirstStep(start_ids),
            ));
        }

        // ── Step 5+6: execute, score, predict ────────────────────────────────
        let mut accumulator = LossAccumulator::<B>::default();
        let mut predictions = Vec::with_capacity(instances.len());

        for (index, instance) in instances.iter().enumerate() {
            let states = finished.remove(&index).unwrap_or_default();
            let gold   = if self.supervise_attention {
                gold_supervision::<B>(instance, device)
            } else {
                GoldSupervision::default()
            };
            let supervised = matches!(modes[index], Supervision::GoldSequence(_));

            let (ll, prediction) = self.score_instance(
                instance,
                &languages[index],
                states,
                &gold,
                supervised,
                &vocab,
                &mut accumulator,
            );
            match ll {
                Some(ll) => accumulator.add_instance(ll),
                None => debug!(query_id = %instance.query_id, "No measurable program for instance"),
            }
            predictions.push(prediction);
        }

        let loss = accumulator.finish(instances.len(), device);
        info!(
            instances = instances.len(),
            measured = loss.instances,
            skipped_programs = loss.skipped_programs,
            model_loss = loss.model_loss,
            exec_loss = loss.exec_loss,
            "Batch forward pass complete"
        );

        ParserOutput { loss, predictions, vocab }
    }

    fn supervision_for(&self, instance: &DropInstance, tokens: &[String], vocab: &ActionVocab) -> Supervision {
        if self.gold_programs && instance.strongly_supervised {
            if let Some(question_type) = instance.question_type {
                match self.registry.gold_actions(question_type, tokens) {
                    Some(Ok(actions)) => match vocab.ids(&actions) {
                        Ok(ids) => return Supervision::GoldSequence(ids),
                        Err(e) => warn!(query_id = %instance.query_id, "Gold program outside vocabulary: {e}"),
                    },
                    Some(Err(e)) => warn!(query_id = %instance.query_id, "Could not build gold program: {e}"),
                    None => debug!(query_id = %instance.query_id, ?question_type, "No gold program builder"),
                }
            }
        }

        let mut start_types = infer_start_types(&instance.answer);
        if start_types.is_empty() {
            start_types = NodeType::START_TYPES.to_vec();
        }
        Supervision::StartTypes(self.grammar.start_action_ids(&start_types))
    }

    fn score_instance<B: Backend>(
        &self,
        instance:    &DropInstance,
        language:    &DropLanguage<B>,
        states:      Vec<SearchState<B, ()>>,
        gold:        &GoldSupervision<B>,
        supervised:  bool,
        vocab:       &ActionVocab,
        accumulator: &mut LossAccumulator<B>,
    ) -> (Option<Tensor<B, 1>>, Prediction) {
        let mut prediction = Prediction::empty(&instance.query_id);
        let probabilities  = program_log_probs(states.iter().map(|s| s.score.clone()).collect())
            .map(|log_probs| util::to_vec(log_probs.exp()))
            .unwrap_or_default();

        let mut outcomes    = Vec::with_capacity(states.len());
        let mut gold_scores = Vec::new();

        for (rank, state) in states.into_iter().enumerate() {
            let actions = match vocab.strings(&state.action_history) {
                Ok(actions) => actions,
                Err(e) => {
                    warn!(query_id = %instance.query_id, "Dropping program: {e}");
                    continue;
                }
            };

            let mut side_args = state.side_args.clone();
            if !gold.is_empty() {
                route_side_args(&actions, &mut side_args, gold);
            }

            let denotation = match language.execute(&actions, &side_args) {
                Ok(denotation) => denotation,
                Err(e) => {
                    warn!(query_id = %instance.query_id, "Dropping program: {e}");
                    continue;
                }
            };
            accumulator.add_execution_loss(denotation.loss.clone());

            if prediction.score.is_none() {
                prediction.logical_form = self
                    .grammar
                    .action_sequence_to_logical_form(&actions)
                    .unwrap_or_default();
                prediction.score       = Some(state.score_value);
                prediction.probability = probabilities.get(rank).copied();
                prediction.answer      = answer_string(&denotation, instance);
            }

            if supervised {
                gold_scores.push(state.score);
                continue;
            }
            let denotation_ll = match denotation_log_likelihood(&denotation, &instance.answer) {
                Ok(ll) => Some(ll),
                Err(e) => {
                    debug!(query_id = %instance.query_id, "Skipping program in loss: {e}");
                    accumulator.skip_program();
                    None
                }
            };
            outcomes.push(ProgramOutcome { score: state.score, denotation_ll });
        }

        let ll = if supervised {
            supervised_log_likelihood(gold_scores)
        } else {
            marginal_log_likelihood(outcomes)
        };
        (ll, prediction)
    }
}
