use glam::DVec2;
use ordered_float::OrderedFloat;
use regex::Regex;

use super::scenario::*;
use crate::railway::car::LoadType;
use crate::railway::dynamics::EngineParams;
use crate::railway::signal::SignalState;

#[derive(Debug, Fail)]
pub enum ParseError {
    #[fail(display = "error in regular expression: {}", _0)]
    RegexError(String),
    #[fail(display = "line {}: error converting number", _0)]
    NumberError(usize),
    #[fail(display = "line {}: {}", _0, _1)]
    ValueError(usize, String),
    #[fail(display = "line {}: unrecognized statement: {}", _0, _1)]
    Unrecognized(usize, String),
}

const NUM: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

fn regex(pattern: &str) -> Result<Regex, ParseError> {
    let pattern = pattern.replace("NUM", NUM);
    Regex::new(&pattern).map_err(|e| ParseError::RegexError(format!("{:?}", e)))
}

fn num(s: &str, line: usize) -> Result<f64, ParseError> {
    s.parse::<f64>().map_err(|_e| ParseError::NumberError(line))
}

fn value<T: std::str::FromStr<Err = String>>(s: &str, line: usize) -> Result<T, ParseError> {
    s.parse::<T>().map_err(|e| ParseError::ValueError(line, e))
}

/// Parses the scenario format, one statement per line:
///
/// * separation 2.0
/// * node a 0.0 0.0
/// * link a b
/// * signal s1 b
/// * aspect s1 a red
/// * switch b a c
/// * interval coal 25
/// * train t1 top=10 acc=1 dec=2
/// * car t1 a b 5.0 0.0 coal
/// * at 12.5 aspect s1 a green
/// * at 20 load t1 50
/// * at 40 endload t1
/// * run 100 step 0.1
///
/// `#` starts a comment. Timed events are sorted by time, keeping the
/// written order for equal times.
pub fn parse_scenario(input: &str) -> Result<Scenario, ParseError> {
    let separation_re = regex(r"^separation\s+(NUM)$")?;
    let node_re = regex(r"^node\s+(\w+)\s+(NUM)\s+(NUM)$")?;
    let link_re = regex(r"^link\s+(\w+)\s+(\w+)$")?;
    let signal_re = regex(r"^signal\s+(\w+)\s+(\w+)$")?;
    let aspect_re = regex(r"^aspect\s+(\w+)\s+(\w+)\s+(\w+)$")?;
    let switch_re = regex(r"^switch\s+(\w+)\s+(\w+)\s+(\w+)$")?;
    let interval_re = regex(r"^interval\s+(\w+)\s+(NUM)$")?;
    let train_re = regex(r"(?x) ^ train \s+ (?P<name>\w+) \s+
            top \s* = \s* (?P<top>NUM) \s+
            acc \s* = \s* (?P<acc>NUM) \s+
            dec \s* = \s* (?P<dec>NUM) $")?;
    let car_re = regex(r"^car\s+(\w+)\s+(\w+)\s+(\w+)\s+(NUM)\s+(NUM)(?:\s+(\w+))?$")?;
    let at_aspect_re = regex(r"^at\s+(NUM)\s+aspect\s+(\w+)\s+(\w+)\s+(\w+)$")?;
    let at_load_re = regex(r"^at\s+(NUM)\s+(load|unload)\s+(\w+)\s+(NUM)$")?;
    let at_endload_re = regex(r"^at\s+(NUM)\s+endload\s+(\w+)$")?;
    let run_re = regex(r"^run\s+(NUM)\s+step\s+(NUM)$")?;

    let mut s = Scenario::default();
    for (idx, raw) in input.lines().enumerate() {
        let n = idx + 1;
        let line = match raw.find('#') {
            Some(i) => &raw[..i],
            None => raw,
        }.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(g) = separation_re.captures(line) {
            s.separation = Some(num(&g[1], n)?);
        } else if let Some(g) = node_re.captures(line) {
            s.nodes.push((g[1].to_string(), DVec2::new(num(&g[2], n)?, num(&g[3], n)?)));
        } else if let Some(g) = link_re.captures(line) {
            s.links.push((g[1].to_string(), g[2].to_string()));
        } else if let Some(g) = signal_re.captures(line) {
            s.signals.push((g[1].to_string(), g[2].to_string()));
        } else if let Some(g) = aspect_re.captures(line) {
            s.aspects.push(AspectSetting {
                signal: g[1].to_string(),
                approach: g[2].to_string(),
                state: value::<SignalState>(&g[3], n)?,
            });
        } else if let Some(g) = switch_re.captures(line) {
            s.switches.push((g[1].to_string(), g[2].to_string(), g[3].to_string()));
        } else if let Some(g) = interval_re.captures(line) {
            s.intervals.push((value::<LoadType>(&g[1], n)?, num(&g[2], n)?));
        } else if let Some(g) = train_re.captures(line) {
            let params = EngineParams {
                top_speed: num(&g["top"], n)?,
                acceleration: num(&g["acc"], n)?,
                deceleration: num(&g["dec"], n)?,
            };
            params.validate().map_err(|e| ParseError::ValueError(n, e.to_string()))?;
            s.trains.push(TrainSpec { name: g["name"].to_string(), params: params });
        } else if let Some(g) = car_re.captures(line) {
            let load = match g.get(6) {
                Some(m) => Some(value::<LoadType>(m.as_str(), n)?),
                None => None,
            };
            s.cars.push(CarSpec {
                train: g[1].to_string(),
                current: g[2].to_string(),
                target: g[3].to_string(),
                position: DVec2::new(num(&g[4], n)?, num(&g[5], n)?),
                load: load,
            });
        } else if let Some(g) = at_aspect_re.captures(line) {
            s.events.push(TimedEvent {
                time: num(&g[1], n)?,
                action: ScenarioAction::Aspect(AspectSetting {
                    signal: g[2].to_string(),
                    approach: g[3].to_string(),
                    state: value::<SignalState>(&g[4], n)?,
                }),
            });
        } else if let Some(g) = at_load_re.captures(line) {
            s.events.push(TimedEvent {
                time: num(&g[1], n)?,
                action: ScenarioAction::Load {
                    train: g[3].to_string(),
                    amount: num(&g[4], n)?,
                    loading: &g[2] == "load",
                },
            });
        } else if let Some(g) = at_endload_re.captures(line) {
            s.events.push(TimedEvent {
                time: num(&g[1], n)?,
                action: ScenarioAction::EndLoad { train: g[2].to_string() },
            });
        } else if let Some(g) = run_re.captures(line) {
            s.run = Some((num(&g[1], n)?, num(&g[2], n)?));
        } else {
            return Err(ParseError::Unrecognized(n, line.to_string()));
        }
    }

    s.events.sort_by_key(|e| OrderedFloat(e.time));
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP: &str = "
        # a small loop
        separation 2
        node a 0 0
        node b 10.0 0
        node c 10 10
        link a b   # bottom
        link b c
        link c a
        signal s1 b
        aspect s1 a red
        interval coal 20
        train t1 top=4 acc=1.5 dec=2e0
        car t1 a b 6 0
        car t1 a b 4 0 coal
        at 5 endload t1
        at 1.5 aspect s1 a green
        at 2 unload t1 10
        run 30 step .1
    ";

    #[test]
    fn parses_all_statements() {
        let s = parse_scenario(LOOP).unwrap();
        assert_eq!(s.separation, Some(2.0));
        assert_eq!(s.nodes.len(), 3);
        assert_eq!(s.nodes[1], ("b".to_string(), DVec2::new(10.0, 0.0)));
        assert_eq!(s.links.len(), 3);
        assert_eq!(s.aspects[0].state, SignalState::Red);
        assert_eq!(s.intervals, vec![(LoadType::Coal, 20.0)]);
        assert_eq!(s.trains[0].params, EngineParams { top_speed: 4.0, acceleration: 1.5, deceleration: 2.0 });
        assert_eq!(s.cars[0].load, None);
        assert_eq!(s.cars[1].load, Some(LoadType::Coal));
        assert_eq!(s.run, Some((30.0, 0.1)));

        let times: Vec<f64> = s.events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1.5, 2.0, 5.0]);
        assert_eq!(s.events[1].action,
                   ScenarioAction::Load { train: "t1".to_string(), amount: 10.0, loading: false });
    }

    #[test]
    fn reports_line_numbers() {
        match parse_scenario("node a 0 0\nnode b x 0\n") {
            Err(ParseError::Unrecognized(2, _)) => {}
            r => panic!("unexpected {:?}", r),
        }
        match parse_scenario("aspect s1 a purple") {
            Err(ParseError::ValueError(1, _)) => {}
            r => panic!("unexpected {:?}", r),
        }
        match parse_scenario("interval gold 10") {
            Err(ParseError::ValueError(1, _)) => {}
            r => panic!("unexpected {:?}", r),
        }
        match parse_scenario("node a 0 0\ntrain t1 top=4 acc=1 dec=0\n") {
            Err(ParseError::ValueError(2, ref msg)) => assert!(msg.contains("deceleration")),
            r => panic!("unexpected {:?}", r),
        }
        match parse_scenario("train t1 top=4 acc=-1 dec=2") {
            Err(ParseError::ValueError(1, _)) => {}
            r => panic!("unexpected {:?}", r),
        }
    }

    #[test]
    fn builds_named_world() {
        let s = parse_scenario(LOOP).unwrap();
        let (world, names) = s.build(Default::default()).unwrap();
        assert_eq!(names.node("c").unwrap(), 2);
        assert_eq!(names.train("t1").unwrap(), 0);
        assert_eq!(world.trains()[0].cars().len(), 2);
        assert_eq!(world.topology().signal(names.signal("s1").unwrap()).state(0), SignalState::Red);

        let mut bad = s.clone();
        bad.cars[0].train = "t2".to_string();
        bad.cars[1].train = "t2".to_string();
        assert!(match bad.build(Default::default()) { Err(ScenarioError::NoCars(_)) => true, _ => false });
    }
}
