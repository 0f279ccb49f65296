use bikebay::alert::{AlertEngine, AlertKind, AlertTiming};
use bikebay::bay::{BayId, BayStatus};
use bikebay::peripherals::sim::SimulatedAlertOutputs;
use bikebay::peripherals::IndicatorColor;

const BAY_1: BayId = BayId(1);
const BAY_2: BayId = BayId(2);

fn engine() -> (AlertEngine, SimulatedAlertOutputs) {
    let outputs = SimulatedAlertOutputs::new();
    let engine = AlertEngine::new(
        AlertTiming::default(),
        Box::new(outputs.clone()),
        [BAY_1, BAY_2],
    );
    (engine, outputs)
}

fn run(engine: &mut AlertEngine, from: u64, to: u64, step: u64, statuses: &[(BayId, BayStatus)]) {
    let mut now = from;
    while now <= to {
        engine.tick(now, statuses);
        now += step;
    }
}

#[test]
fn test_theft_alarm_sounds_five_times_then_stops() {
    let (mut engine, outputs) = engine();
    let statuses = [(BAY_1, BayStatus::Stolen), (BAY_2, BayStatus::Available)];

    assert!(engine.trigger(BAY_1, AlertKind::TheftAlarm, 0));
    run(&mut engine, 0, 20_000, 50, &statuses);

    assert_eq!(outputs.alarm_rising_edges(), 5);
    assert!(!outputs.alarm_on());
    assert!(engine.active_pattern(BAY_1).is_none());
    assert_eq!(engine.stats().patterns_completed, 1);
    assert_eq!(outputs.indicator(BAY_1), IndicatorColor::Orange);
    assert_eq!(outputs.indicator(BAY_2), IndicatorColor::Green);
}

#[test]
fn test_theft_alarm_cadence() {
    let (mut engine, outputs) = engine();
    let statuses = [(BAY_1, BayStatus::Stolen)];
    engine.trigger(BAY_1, AlertKind::TheftAlarm, 1000);

    engine.tick(1000, &statuses);
    assert!(outputs.alarm_on());
    assert_eq!(outputs.indicator(BAY_1), IndicatorColor::Orange);

    engine.tick(1999, &statuses);
    assert!(outputs.alarm_on());

    engine.tick(2000, &statuses);
    assert!(!outputs.alarm_on());
    assert_eq!(outputs.indicator(BAY_1), IndicatorColor::Off);
    assert_eq!(engine.active_pattern(BAY_1).unwrap().cycles_done, 1);

    engine.tick(3000, &statuses);
    assert!(outputs.alarm_on());

    // Fifth low phase begins at 10 s: pattern done
    engine.tick(9999, &statuses);
    assert!(outputs.alarm_on());
    engine.tick(10_000, &statuses);
    assert!(!outputs.alarm_on());
    assert!(engine.active_pattern(BAY_1).is_none());
}

#[test]
fn test_late_tick_does_not_extend_alarm() {
    let (mut engine, outputs) = engine();
    engine.trigger(BAY_1, AlertKind::TheftAlarm, 0);
    engine.tick(0, &[]);

    // A single tick long after the pattern ended just turns it off
    engine.tick(60_000, &[]);
    assert!(!outputs.alarm_on());
    assert!(engine.active_pattern(BAY_1).is_none());
}

#[test]
fn test_ack_is_a_single_short_beep() {
    let (mut engine, outputs) = engine();
    let statuses = [(BAY_1, BayStatus::Available)];

    assert!(engine.trigger(BAY_1, AlertKind::Ack, 500));
    engine.tick(500, &statuses);
    assert!(outputs.alarm_on());
    // An ack does not flash the indicator
    assert_eq!(outputs.indicator(BAY_1), IndicatorColor::Green);

    engine.tick(599, &statuses);
    assert!(outputs.alarm_on());
    engine.tick(600, &statuses);
    assert!(!outputs.alarm_on());

    run(&mut engine, 650, 3000, 50, &statuses);
    assert_eq!(outputs.alarm_rising_edges(), 1);
    assert_eq!(engine.stats().acks_triggered, 1);
}

#[test]
fn test_ack_dropped_while_theft_alarm_runs() {
    let (mut engine, outputs) = engine();
    engine.trigger(BAY_1, AlertKind::TheftAlarm, 0);
    engine.tick(0, &[]);

    assert!(!engine.trigger(BAY_1, AlertKind::Ack, 200));
    assert_eq!(engine.stats().acks_dropped, 1);
    assert_eq!(engine.active_pattern(BAY_1).unwrap().kind, AlertKind::TheftAlarm);

    // The other bay's slot is free
    assert!(engine.trigger(BAY_2, AlertKind::Ack, 200));

    run(&mut engine, 50, 12_000, 50, &[]);
    assert_eq!(outputs.alarm_rising_edges(), 5);

    // Once finished, acks are accepted again
    assert!(engine.trigger(BAY_1, AlertKind::Ack, 12_000));
}

#[test]
fn test_theft_alarm_preempts_ack() {
    let (mut engine, _outputs) = engine();
    engine.trigger(BAY_1, AlertKind::Ack, 0);
    assert!(engine.trigger(BAY_1, AlertKind::TheftAlarm, 50));
    assert_eq!(engine.active_pattern(BAY_1).unwrap().kind, AlertKind::TheftAlarm);
}

#[test]
fn test_new_theft_alarm_restarts_pattern() {
    let (mut engine, _outputs) = engine();
    engine.trigger(BAY_1, AlertKind::TheftAlarm, 0);
    engine.tick(4500, &[]);
    assert_eq!(engine.active_pattern(BAY_1).unwrap().cycles_done, 2);

    assert!(engine.trigger(BAY_1, AlertKind::TheftAlarm, 4500));
    let pattern = engine.active_pattern(BAY_1).unwrap();
    assert_eq!(pattern.started_at, 4500);
    assert_eq!(pattern.cycles_done, 0);
    assert_eq!(engine.stats().theft_alarms_triggered, 2);
}

#[test]
fn test_concurrent_alarms_share_the_buzzer() {
    let (mut engine, outputs) = engine();
    let statuses = [(BAY_1, BayStatus::Stolen), (BAY_2, BayStatus::Stolen)];
    engine.trigger(BAY_1, AlertKind::TheftAlarm, 0);
    engine.trigger(BAY_2, AlertKind::TheftAlarm, 500);

    engine.tick(1200, &statuses);
    // Bay 1 is low, bay 2 still high
    assert!(outputs.alarm_on());
    assert_eq!(outputs.indicator(BAY_1), IndicatorColor::Off);
    assert_eq!(outputs.indicator(BAY_2), IndicatorColor::Orange);

    engine.tick(1600, &statuses);
    assert!(!outputs.alarm_on());

    engine.tick(9200, &statuses);
    // Bay 1 finished, bay 2 in its last high phase
    assert!(engine.active_pattern(BAY_1).is_none());
    assert!(outputs.alarm_on());

    engine.tick(10_500, &statuses);
    assert!(!outputs.alarm_on());
    assert!(engine.active_pattern(BAY_2).is_none());
}

#[test]
fn test_unknown_bay_is_ignored() {
    let (mut engine, _outputs) = engine();
    assert!(!engine.trigger(BayId(7), AlertKind::TheftAlarm, 0));
    assert_eq!(engine.stats().theft_alarms_triggered, 0);
}

#[test]
fn test_steady_indicator_follows_status() {
    let (mut engine, outputs) = engine();

    engine.tick(0, &[(BAY_1, BayStatus::Available), (BAY_2, BayStatus::Occupied)]);
    assert_eq!(outputs.indicator(BAY_1), IndicatorColor::Green);
    assert_eq!(outputs.indicator(BAY_2), IndicatorColor::Red);

    engine.tick(50, &[(BAY_1, BayStatus::Occupied), (BAY_2, BayStatus::Available)]);
    assert_eq!(outputs.indicator(BAY_1), IndicatorColor::Red);
    assert_eq!(outputs.indicator(BAY_2), IndicatorColor::Green);
}

#[test]
fn test_output_failures_are_counted_not_fatal() {
    let (mut engine, outputs) = engine();
    outputs.set_failing(true);

    engine.trigger(BAY_1, AlertKind::TheftAlarm, 0);
    engine.tick(0, &[(BAY_1, BayStatus::Stolen)]);
    assert!(engine.stats().output_failures > 0);
    assert!(engine.is_alarm_on());
}
