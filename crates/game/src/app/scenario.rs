use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use sim::entity::Movable;
use sim::world::{AggroEvent, AttackEvent, DeathEvent, LootEvent};
use sim::{EntityId, GridPos, KindDatabase, OccupancyGrid, SimConfig, World};
use tracing::{debug, info, warn};

use super::bootstrap::AppError;

const MAP_WIDTH: usize = 60;
const MAP_HEIGHT: usize = 16;
const PLAYER_DAMAGE_PER_RANK: i32 = 4;
const MONSTER_DAMAGE: i32 = 3;

type EventQueue<E> = Rc<RefCell<VecDeque<E>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Go { actor: &'static str, cell: GridPos },
    Engage { actor: &'static str, target: &'static str },
}

#[derive(Debug, Clone, Copy)]
struct ScriptStep {
    at_ms: u64,
    command: Command,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ScenarioSummary {
    pub(crate) commands_run: usize,
    pub(crate) hits: usize,
    pub(crate) absorbed: usize,
    pub(crate) deaths: usize,
    pub(crate) loot_messages: Vec<String>,
}

/// Scripted demo session: spawns the cast, issues timed commands and plays
/// the server's part by resolving aggro and damage.
pub(crate) struct Scenario {
    actors: BTreeMap<&'static str, EntityId>,
    script: VecDeque<ScriptStep>,
    aggro: EventQueue<AggroEvent>,
    attacks: EventQueue<AttackEvent>,
    deaths: EventQueue<DeathEvent>,
    loot: EventQueue<LootEvent>,
    summary: ScenarioSummary,
}

impl Scenario {
    pub(crate) fn build(
        config: SimConfig,
        kinds: Arc<KindDatabase>,
    ) -> Result<(World, Scenario), AppError> {
        let mut world = World::new(config, kinds);
        let rows = demo_map_rows();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        world.load_map(OccupancyGrid::from_rows(&rows)?);

        let mut actors = BTreeMap::new();
        for (name, kind, cell) in [
            ("player", "warrior", GridPos::new(4, 6)),
            ("guard", "guard", GridPos::new(3, 3)),
            ("sword", "sword2", GridPos::new(8, 6)),
            ("potion", "firepotion", GridPos::new(8, 10)),
            ("rat", "rat", GridPos::new(12, 12)),
            ("goblin", "goblin", GridPos::new(22, 6)),
        ] {
            actors.insert(name, world.spawn(kind, cell)?);
        }
        if let Some(cell) = world.player().map(Movable::grid_position) {
            world.camera_mut().focus_on(cell);
        }

        let scenario = Scenario::new(&mut world, actors, default_script());
        Ok((world, scenario))
    }

    fn new(
        world: &mut World,
        actors: BTreeMap<&'static str, EntityId>,
        script: Vec<ScriptStep>,
    ) -> Self {
        let aggro: EventQueue<AggroEvent> = Rc::default();
        let attacks: EventQueue<AttackEvent> = Rc::default();
        let deaths: EventQueue<DeathEvent> = Rc::default();
        let loot: EventQueue<LootEvent> = Rc::default();

        let hooks = world.hooks_mut();
        let queue = Rc::clone(&aggro);
        hooks
            .aggro
            .register(move |event| queue.borrow_mut().push_back(*event));
        let queue = Rc::clone(&attacks);
        hooks
            .attack
            .register(move |event| queue.borrow_mut().push_back(*event));
        let queue = Rc::clone(&deaths);
        hooks
            .death
            .register(move |event| queue.borrow_mut().push_back(*event));
        let queue = Rc::clone(&loot);
        hooks
            .loot
            .register(move |event| queue.borrow_mut().push_back(event.clone()));

        Self {
            actors,
            script: script.into(),
            aggro,
            attacks,
            deaths,
            loot,
            summary: ScenarioSummary::default(),
        }
    }

    pub(crate) fn actor(&self, name: &str) -> Option<EntityId> {
        self.actors.get(name).copied()
    }

    pub(crate) fn summary(&self) -> &ScenarioSummary {
        &self.summary
    }

    /// Issues every scripted command due at `now`.
    pub(crate) fn before_tick(&mut self, world: &mut World, now: u64) {
        while let Some(step) = self.script.front().copied() {
            if step.at_ms > now {
                break;
            }
            self.script.pop_front();
            self.run_command(world, step.command);
        }
    }

    /// Resolves what the frame reported through the hooks.
    pub(crate) fn after_tick(&mut self, world: &mut World) {
        let aggro: Vec<AggroEvent> = self.aggro.borrow_mut().drain(..).collect();
        for event in aggro {
            self.confirm_aggro(world, event);
        }
        let attacks: Vec<AttackEvent> = self.attacks.borrow_mut().drain(..).collect();
        for event in attacks {
            self.apply_hit(world, event);
        }
        let deaths: Vec<DeathEvent> = self.deaths.borrow_mut().drain(..).collect();
        self.summary.deaths += deaths.len();
        let loot: Vec<LootEvent> = self.loot.borrow_mut().drain(..).collect();
        for event in loot {
            let message = match &event.result {
                Ok(message) => message.clone(),
                Err(err) => err.to_string(),
            };
            info!(item = event.item_kind.as_str(), message = message.as_str(), "loot_message");
            self.summary.loot_messages.push(message);
        }
    }

    fn run_command(&mut self, world: &mut World, command: Command) {
        match command {
            Command::Go { actor, cell } => {
                let Some(id) = self.actor(actor) else {
                    warn!(actor, "script_actor_missing");
                    return;
                };
                info!(actor, x = cell.x, y = cell.y, "script_go");
                world.go(id, cell);
            }
            Command::Engage { actor, target } => {
                let (Some(id), Some(target_id)) = (self.actor(actor), self.actor(target)) else {
                    warn!(actor, target, "script_actor_missing");
                    return;
                };
                info!(actor, target, "script_engage");
                world.engage(id, target_id);
            }
        }
        self.summary.commands_run += 1;
    }

    fn confirm_aggro(&mut self, world: &mut World, event: AggroEvent) {
        let monster_ready = world
            .combatant(event.monster)
            .map(|c| !c.is_dead() && !c.is_attacking())
            .unwrap_or(false);
        if !monster_ready {
            return;
        }
        world.engage(event.monster, event.player);

        let player_idle = world
            .combatant(event.player)
            .map(|c| !c.is_dead() && c.target().is_none() && !c.is_moving())
            .unwrap_or(false);
        if player_idle {
            world.engage(event.player, event.monster);
        }
    }

    fn apply_hit(&mut self, world: &mut World, event: AttackEvent) {
        let Some(target) = world.entity(event.target) else {
            return;
        };
        let Some(hit_points) = target.combatant().map(|c| c.hit_points()) else {
            return;
        };
        if target.is_dead() {
            return;
        }
        if target.player_state().map(|p| p.is_invincible()).unwrap_or(false) {
            debug!(target_id = event.target.0, "hit_absorbed");
            self.summary.absorbed += 1;
            return;
        }

        let damage = damage_of(world, event.attacker);
        let remaining = (hit_points - damage).max(0);
        world.set_hit_points(event.target, remaining);
        world.hurt(event.target);
        self.summary.hits += 1;
        debug!(
            attacker_id = event.attacker.0,
            target_id = event.target.0,
            damage,
            remaining,
            "hit_applied"
        );
        if remaining == 0 {
            world.die(event.target);
        }
    }
}

fn damage_of(world: &World, attacker: EntityId) -> i32 {
    let weapon_rank = world
        .entity(attacker)
        .and_then(|entity| entity.player_state())
        .and_then(|state| state.weapon())
        .and_then(|weapon| world.kinds().rank_of(weapon));
    match weapon_rank {
        Some(rank) => PLAYER_DAMAGE_PER_RANK * rank.max(1) as i32,
        None => MONSTER_DAMAGE,
    }
}

fn default_script() -> Vec<ScriptStep> {
    vec![
        ScriptStep {
            at_ms: 100,
            command: Command::Go {
                actor: "player",
                cell: GridPos::new(8, 6),
            },
        },
        ScriptStep {
            at_ms: 2_000,
            command: Command::Go {
                actor: "player",
                cell: GridPos::new(8, 10),
            },
        },
        ScriptStep {
            at_ms: 3_500,
            command: Command::Engage {
                actor: "player",
                target: "rat",
            },
        },
        ScriptStep {
            at_ms: 12_000,
            command: Command::Go {
                actor: "player",
                cell: GridPos::new(19, 6),
            },
        },
    ]
}

/// Walled field with a short interior wall.
fn demo_map_rows() -> Vec<String> {
    (0..MAP_HEIGHT)
        .map(|y| {
            (0..MAP_WIDTH)
                .map(|x| {
                    let border = x == 0 || y == 0 || x == MAP_WIDTH - 1 || y == MAP_HEIGHT - 1;
                    let wall = x == 16 && (3..=9).contains(&y);
                    if border || wall {
                        '#'
                    } else {
                        '.'
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use sim::{FrameOrchestrator, SimConfig};

    use super::*;

    fn demo() -> (World, Scenario) {
        let kinds = sim::builtin_kind_database().expect("builtin");
        Scenario::build(SimConfig::default(), Arc::new(kinds)).expect("scenario")
    }

    fn run(world: &mut World, scenario: &mut Scenario, until: u64) {
        let mut orchestrator = FrameOrchestrator::new(world.config());
        let frame = world.config().frame_duration_ms();
        let mut now = frame;
        while now <= until {
            scenario.before_tick(world, now);
            orchestrator.update(world, now);
            scenario.after_tick(world);
            now += frame;
        }
    }

    #[test]
    fn demo_map_is_walled() {
        let rows = demo_map_rows();
        assert_eq!(rows.len(), MAP_HEIGHT);
        assert!(rows[0].chars().all(|c| c == '#'));
        assert_eq!(rows[5].chars().nth(16), Some('#'));
        assert_eq!(rows[5].chars().nth(15), Some('.'));
    }

    #[test]
    fn build_spawns_cast_and_focuses_camera() {
        let (world, scenario) = demo();

        assert_eq!(world.entity_count(), 6);
        assert_eq!(world.player_id(), scenario.actor("player"));
        assert_eq!(world.camera().grid_position(), GridPos::new(0, 0));
    }

    #[test]
    fn player_loots_the_sword_on_arrival() {
        let (mut world, mut scenario) = demo();
        let sword = scenario.actor("sword").expect("sword");

        run(&mut world, &mut scenario, 1_900);

        assert!(!world.contains(sword));
        assert_eq!(
            scenario.summary().loot_messages,
            vec!["You pick up a steel sword".to_string()]
        );
    }

    #[test]
    fn engaged_rat_is_killed_and_removed() {
        let (mut world, mut scenario) = demo();
        let rat = scenario.actor("rat").expect("rat");

        run(&mut world, &mut scenario, 11_000);

        assert!(!world.contains(rat));
        assert!(scenario.summary().deaths >= 1);
        assert!(scenario.summary().hits >= 3);
        let player = world.combatant(scenario.actor("player").expect("player"));
        assert_eq!(player.and_then(|c| c.target()), None);
    }

    #[test]
    fn invincible_player_absorbs_hits() {
        let (mut world, mut scenario) = demo();
        let player = scenario.actor("player").expect("player");
        let goblin = scenario.actor("goblin").expect("goblin");
        world.start_invincibility(player);

        scenario.apply_hit(
            &mut world,
            AttackEvent {
                attacker: goblin,
                target: player,
            },
        );

        assert_eq!(scenario.summary().absorbed, 1);
        assert_eq!(world.combatant(player).expect("player").hit_points(), 80);
    }

    #[test]
    fn lethal_hit_kills_the_target() {
        let (mut world, mut scenario) = demo();
        let player = scenario.actor("player").expect("player");
        let rat = scenario.actor("rat").expect("rat");
        world.set_hit_points(rat, 3);

        scenario.apply_hit(
            &mut world,
            AttackEvent {
                attacker: player,
                target: rat,
            },
        );

        assert!(world.entity(rat).expect("rat").is_dead());
    }
}
