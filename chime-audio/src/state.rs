//! Hierarchical mute/pause/volume state.
//!
//! Flags are combined at three levels: global, per-domain and per-voice.
//! Setters at one level never overwrite the stored flags of another level;
//! the audible result is always re-derived from all three, so toggling a
//! higher level off restores the lower levels exactly.

/// A grouping for mute/pause/volume that sits between the global level and
/// the individual voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// The interruptible sound effect voices.
    Effect,
    /// The persistent background track.
    Background,
}

/// The mute/pause/volume fields stored at one level of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LevelState {
    pub(crate) muted: bool,
    pub(crate) paused: bool,
    pub(crate) volume: f32,
}

impl Default for LevelState {
    fn default() -> Self {
        Self {
            muted: false,
            paused: false,
            volume: 1.0,
        }
    }
}

/// The combined state actually applied to a voice's audible output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EffectiveState {
    pub(crate) muted: bool,
    pub(crate) paused: bool,
    pub(crate) volume: f32,
}

impl EffectiveState {
    /// The linear gain the backend should apply, with the mute flag folded
    /// in. Stored flags remain untouched.
    pub(crate) fn gain(&self) -> f32 {
        match self.muted {
            true => 0.0,
            false => self.volume,
        }
    }
}

/// Combines the three contributing levels into the state applied to a voice.
pub(crate) fn combine(voice: LevelState, domain: LevelState, global: LevelState) -> EffectiveState {
    EffectiveState {
        muted: voice.muted || domain.muted || global.muted,
        paused: voice.paused || domain.paused || global.paused,
        volume: voice.volume * domain.volume * global.volume,
    }
}

/// Holds the global and per-domain levels of the hierarchy. The per-voice
/// level lives on the voices themselves.
#[derive(Debug, Default)]
pub(crate) struct StateCoordinator {
    global: LevelState,
    effect: LevelState,
    background: LevelState,
}

impl StateCoordinator {
    pub(crate) fn global(&self) -> LevelState {
        self.global
    }

    pub(crate) fn domain(&self, domain: Domain) -> LevelState {
        match domain {
            Domain::Effect => self.effect,
            Domain::Background => self.background,
        }
    }

    pub(crate) fn set_global_muted(&mut self, muted: bool) {
        self.global.muted = muted;
    }

    pub(crate) fn set_global_paused(&mut self, paused: bool) {
        self.global.paused = paused;
    }

    pub(crate) fn set_global_volume(&mut self, volume: f32) {
        self.global.volume = volume;
    }

    pub(crate) fn set_domain_muted(&mut self, domain: Domain, muted: bool) {
        self.domain_mut(domain).muted = muted;
    }

    pub(crate) fn set_domain_paused(&mut self, domain: Domain, paused: bool) {
        self.domain_mut(domain).paused = paused;
    }

    pub(crate) fn set_domain_volume(&mut self, domain: Domain, volume: f32) {
        self.domain_mut(domain).volume = volume;
    }

    fn domain_mut(&mut self, domain: Domain) -> &mut LevelState {
        match domain {
            Domain::Effect => &mut self.effect,
            Domain::Background => &mut self.background,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(muted: bool, paused: bool, volume: f32) -> LevelState {
        LevelState { muted, paused, volume }
    }

    #[test]
    fn test_combine_volume_is_multiplicative() {
        let effective = combine(voice(false, false, 0.5), voice(false, false, 0.5), voice(false, false, 0.5));
        assert_eq!(effective.volume, 0.125);
        assert_eq!(effective.gain(), 0.125);
    }

    #[test]
    fn test_combine_any_level_mutes() {
        for index in 0..3 {
            let mut levels = [LevelState::default(); 3];
            levels[index].muted = true;

            let effective = combine(levels[0], levels[1], levels[2]);
            assert!(effective.muted);
            assert_eq!(effective.gain(), 0.0);
        }
    }

    #[test]
    fn test_combine_any_level_pauses() {
        for index in 0..3 {
            let mut levels = [LevelState::default(); 3];
            levels[index].paused = true;

            let effective = combine(levels[0], levels[1], levels[2]);
            assert!(effective.paused);
        }
    }

    #[test]
    fn test_levels_do_not_overwrite_each_other() {
        let mut coordinator = StateCoordinator::default();
        let voice_level = voice(true, false, 0.8);

        coordinator.set_global_muted(true);
        coordinator.set_global_muted(false);

        // The voice contribution is untouched by the global round-trip.
        let effective = combine(voice_level, coordinator.domain(Domain::Effect), coordinator.global());
        assert!(effective.muted);

        coordinator.set_domain_muted(Domain::Effect, true);
        assert!(!coordinator.domain(Domain::Background).muted);
        assert!(!coordinator.global().muted);
    }
}
