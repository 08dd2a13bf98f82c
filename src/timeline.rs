//! Progress timeline derived from a chain's grants and approval events
//!
//! Grants are grouped into stages by actor: one stage per external
//! directorate and one per internal user, in order of first appearance. An
//! internal grant issued by a directorate that already has a stage is nested
//! under that stage as one of its internal participants. A participant added
//! after the chain moved past its stage is passed along with that stage.
//!
//! The stages are flattened into steps (stage head first, then participants)
//! and the approval events are replayed over them in log order. Each event
//! lands on the first unfinished step, at or after the last step touched,
//! that already existed when the event was written.
use super::context::{ApprovalEvent, ApprovalStatus, ChainState, RouteContext};
use super::directory::Directory;
use super::error::{Result, RoutingError};
use super::grant::{ChainKey, DirectorateId, Route, RouteType, TimeStamp, UserId};
use super::store::ChainStore;
use chrono::{TimeDelta, Utc};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    User(UserId),
    Directorate(DirectorateId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    Working,
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub key: ChainKey,
    pub stages: Vec<TimelineStage>,
    pub state: ChainState,
    pub revision: String, // sha256 of the chain log this was derived from
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineStage {
    pub name: String,
    pub actor: Actor,
    pub user_type: RouteType,
    pub status: StageStatus,
    pub timestamp: Option<TimeStamp<Utc>>,
    pub duration: Option<TimeDelta>,
    pub is_approver: bool,
    pub latest_event: Option<ApprovalEvent>,
    pub internal_participants: Vec<TimelineParticipant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineParticipant {
    pub name: String,
    pub user: UserId,
    pub status: StageStatus,
    pub timestamp: Option<TimeStamp<Utc>>,
    pub duration: Option<TimeDelta>,
    pub is_approver: bool,
    pub latest_event: Option<ApprovalEvent>,
}

impl Timeline {
    pub fn working_stage(&self) -> Option<&TimelineStage> {
        self.stages
            .iter()
            .find(|stage| stage.status == StageStatus::Working)
    }
}

impl TimelineStage {
    pub fn duration_label(&self) -> Option<String> {
        self.duration.map(humanize)
    }
}

impl TimelineParticipant {
    pub fn duration_label(&self) -> Option<String> {
        self.duration.map(humanize)
    }
}

/// Renders a stage duration the way the progress bar shows it.
pub fn humanize(delta: TimeDelta) -> String {
    let minutes = delta.num_minutes();
    if minutes < 1 {
        return "under a minute".to_string();
    }
    let days = minutes / (24 * 60);
    let hours = (minutes % (24 * 60)) / 60;
    let mins = minutes % 60;

    match (days, hours) {
        (0, 0) => format!("{mins}m"),
        (0, _) => format!("{hours}h {mins}m"),
        _ => format!("{days}d {hours}h"),
    }
}

#[derive(Debug, Clone)]
struct Step {
    actor: Actor,
    route_type: RouteType,
    is_approver: bool,
    opened: u64, // sequence of the step's first grant
    completed: bool,
    first_touch: Option<TimeStamp<Utc>>,
    approved_at: Option<TimeStamp<Utc>>,
    latest_event: Option<ApprovalEvent>,
}

impl Step {
    fn open(actor: Actor, route_type: RouteType, opened: u64) -> Self {
        Self {
            actor,
            route_type,
            is_approver: false,
            opened,
            completed: false,
            first_touch: None,
            approved_at: None,
            latest_event: None,
        }
    }
}

/// Replayed position of every step of a chain.
#[derive(Debug, Clone)]
pub struct Progress {
    steps: Vec<Step>,
    stages: Vec<Range<usize>>,
    working: Option<usize>,
}

impl Progress {
    pub fn derive(ctx: &RouteContext) -> Self {
        let (steps, stages) = layout(ctx);
        let mut progress = Self {
            steps,
            stages,
            working: None,
        };
        progress.replay(&ctx.events);
        progress
    }

    fn replay(&mut self, events: &[ApprovalEvent]) {
        let mut floor = 0;
        let mut arrivals: Vec<usize> = (0..self.steps.len()).collect();
        arrivals.sort_by_key(|&i| self.steps[i].opened);
        let mut arrivals = arrivals.into_iter().peekable();

        for event in events {
            while let Some(i) = arrivals.next_if(|&i| self.steps[i].opened < event.sequence) {
                self.admit(i, floor);
            }
            let target = (floor..self.steps.len()).find(|&i| {
                !self.steps[i].completed && self.steps[i].opened < event.sequence
            });
            // nothing was working when this event was written
            let Some(i) = target else { continue };

            floor = i;
            let step = &mut self.steps[i];
            if step.first_touch.is_none() {
                step.first_touch = Some(event.created_at.clone());
            }
            if event.status == ApprovalStatus::Approved {
                step.completed = true;
                step.approved_at = Some(event.created_at.clone());
            }
            step.latest_event = Some(event.clone());
        }

        for i in arrivals {
            self.admit(i, floor);
        }

        // a later step was reached, so everything before it was passed
        for step in &mut self.steps[..floor] {
            step.completed = true;
        }
        self.working = (floor..self.steps.len()).find(|&i| !self.steps[i].completed);
    }

    /// Brings a step into the replay as of its grant. A step joining a stage
    /// the chain had already moved past is passed along with that stage.
    fn admit(&mut self, step: usize, floor: usize) {
        let opened = self.steps[step].opened;
        let existed = |i: &usize| self.steps[*i].opened < opened;
        let frontier = (floor..self.steps.len())
            .filter(existed)
            .find(|&i| !self.steps[i].completed)
            .or_else(|| (0..self.steps.len()).filter(existed).max().map(|i| i + 1))
            .unwrap_or(0);

        if self.stages[self.stage_of(step)].end <= frontier {
            self.steps[step].completed = true;
        }
    }

    pub fn state(&self) -> ChainState {
        if self.steps.is_empty() {
            return ChainState::Unrouted;
        }
        let Some(working) = self.working else {
            return ChainState::Completed;
        };

        let stage = self.stage_of(working);
        match &self.steps[working].latest_event {
            Some(event) if event.status == ApprovalStatus::UnderReview => {
                ChainState::UnderReview { stage }
            }
            Some(event) if event.status == ApprovalStatus::Rejected => ChainState::Rejected {
                stage,
                message: event.message.clone(),
            },
            // handed on by an approval further up the chain
            Some(_) => ChainState::UnderReview { stage },
            None if self.steps.iter().any(|step| step.approved_at.is_some()) => {
                ChainState::UnderReview { stage }
            }
            None => ChainState::Routed { stage },
        }
    }

    fn stage_of(&self, step: usize) -> usize {
        self.stages
            .iter()
            .position(|range| range.contains(&step))
            .unwrap_or(0)
    }

    fn step_status(&self, i: usize) -> StageStatus {
        if self.working == Some(i) {
            StageStatus::Working
        } else if self.steps[i].completed {
            StageStatus::Completed
        } else {
            StageStatus::Pending
        }
    }

    fn stage_status(&self, range: &Range<usize>) -> StageStatus {
        if self.working.is_some_and(|w| range.contains(&w)) {
            StageStatus::Working
        } else if self.steps[range.clone()].iter().all(|step| step.completed) {
            StageStatus::Completed
        } else {
            StageStatus::Pending
        }
    }

    fn step_duration(&self, i: usize, now: &TimeStamp<Utc>) -> Option<TimeDelta> {
        let start = self.steps[i].first_touch.as_ref()?;
        let end = if self.working == Some(i) {
            now.clone()
        } else if let Some(next) = self.steps.get(i + 1).and_then(|s| s.first_touch.clone()) {
            next
        } else {
            self.steps[i].approved_at.clone()?
        };
        Some(elapsed(start, &end))
    }

    fn stage_timestamp(&self, range: &Range<usize>) -> Option<TimeStamp<Utc>> {
        self.steps[range.clone()]
            .iter()
            .find_map(|step| step.first_touch.clone())
    }

    fn stage_duration(&self, index: usize, now: &TimeStamp<Utc>) -> Option<TimeDelta> {
        let range = &self.stages[index];
        let start = self.stage_timestamp(range)?;
        let end = if self.stage_status(range) == StageStatus::Working {
            now.clone()
        } else if let Some(next) = self
            .stages
            .get(index + 1)
            .and_then(|next| self.stage_timestamp(next))
        {
            next
        } else {
            self.steps[range.clone()]
                .iter()
                .filter_map(|step| step.approved_at.clone())
                .max_by_key(|at| at.to_datetime_utc())?
        };
        Some(elapsed(&start, &end))
    }

    fn latest_event(&self, range: &Range<usize>) -> Option<ApprovalEvent> {
        self.steps[range.clone()]
            .iter()
            .filter_map(|step| step.latest_event.as_ref())
            .max_by_key(|event| event.sequence)
            .cloned()
    }

    /// Presentation view of the replayed chain.
    pub fn stages(&self, directory: &dyn Directory, now: &TimeStamp<Utc>) -> Vec<TimelineStage> {
        self.stages
            .iter()
            .enumerate()
            .map(|(index, range)| {
                let head = &self.steps[range.start];
                let internal_participants = (range.start + 1..range.end)
                    .filter_map(|i| {
                        let step = &self.steps[i];
                        let Actor::User(user) = step.actor else {
                            return None;
                        };
                        Some(TimelineParticipant {
                            name: actor_name(directory, step.actor),
                            user,
                            status: self.step_status(i),
                            timestamp: step.first_touch.clone(),
                            duration: self.step_duration(i, now),
                            is_approver: step.is_approver,
                            latest_event: step.latest_event.clone(),
                        })
                    })
                    .collect();

                TimelineStage {
                    name: actor_name(directory, head.actor),
                    actor: head.actor,
                    user_type: head.route_type,
                    status: self.stage_status(range),
                    timestamp: self.stage_timestamp(range),
                    duration: self.stage_duration(index, now),
                    is_approver: head.is_approver,
                    latest_event: self.latest_event(range),
                    internal_participants,
                }
            })
            .collect()
    }
}

fn elapsed(start: &TimeStamp<Utc>, end: &TimeStamp<Utc>) -> TimeDelta {
    (end.to_datetime_utc() - start.to_datetime_utc()).max(TimeDelta::zero())
}

fn actor_name(directory: &dyn Directory, actor: Actor) -> String {
    match actor {
        Actor::User(user) => directory
            .user_name(user)
            .unwrap_or_else(|| format!("User #{user}")),
        Actor::Directorate(directorate) => directory
            .directorate_name(directorate)
            .unwrap_or_else(|| format!("Directorate #{directorate}")),
    }
}

// Groups grants into stages and flattens them into steps.
fn layout(ctx: &RouteContext) -> (Vec<Step>, Vec<Range<usize>>) {
    let mut groups: Vec<Vec<Step>> = vec![];
    let mut seen = HashSet::new();
    let mut directorate_stage: HashMap<DirectorateId, usize> = HashMap::new();
    let mut approvers = HashSet::new();

    for grant in &ctx.grants {
        match &grant.route {
            Route::External { directorate, .. } => {
                let actor = Actor::Directorate(*directorate);
                if !seen.insert(actor) {
                    continue;
                }
                directorate_stage.insert(*directorate, groups.len());
                groups.push(vec![Step::open(
                    actor,
                    RouteType::External,
                    grant.sequence,
                )]);
            }
            Route::Internal {
                user,
                directorate,
                is_approver,
                ..
            } => {
                if grant.is_granted && *is_approver {
                    approvers.insert(*user);
                }
                let actor = Actor::User(*user);
                if !seen.insert(actor) {
                    continue;
                }
                let step = Step::open(actor, RouteType::Internal, grant.sequence);
                match directorate.and_then(|d| directorate_stage.get(&d)) {
                    Some(&stage) => groups[stage].push(step),
                    None => groups.push(vec![step]),
                }
            }
        }
    }

    let mut steps = vec![];
    let mut stages = vec![];
    for group in groups {
        let start = steps.len();
        steps.extend(group);
        stages.push(start..steps.len());
    }

    for step in &mut steps {
        if let Actor::User(user) = step.actor {
            step.is_approver = approvers.contains(&user);
        }
    }

    (steps, stages)
}

/// Builds timelines from the stored chain logs.
pub struct TimelineAggregator {
    chains: ChainStore,
    directory: Arc<dyn Directory + Send + Sync>,
}

impl TimelineAggregator {
    pub fn new(chains: ChainStore, directory: Arc<dyn Directory + Send + Sync>) -> Self {
        Self { chains, directory }
    }

    pub fn build(&self, key: ChainKey) -> Result<Timeline> {
        let ctx = self
            .chains
            .read(&key)?
            .ok_or(RoutingError::NotRouted(key))?;
        build(&ctx, self.directory.as_ref(), &TimeStamp::new())
    }
}

/// Derives the timeline of one chain log. Fails with `NotRouted` when the chain
/// has no grants, so callers can tell "not configured" from an empty chain.
pub fn build(ctx: &RouteContext, directory: &dyn Directory, now: &TimeStamp<Utc>) -> Result<Timeline> {
    if !ctx.is_routed() {
        return Err(RoutingError::NotRouted(ctx.key));
    }

    let progress = Progress::derive(ctx);
    let stages = progress.stages(directory, now);
    tracing::debug!(
        transaction_id = ctx.key.transaction_id,
        sub_module = ctx.key.sub_module,
        stages = stages.len(),
        "timeline derived"
    );

    Ok(Timeline {
        key: ctx.key,
        stages,
        state: progress.state(),
        revision: ctx.revision()?,
    })
}
