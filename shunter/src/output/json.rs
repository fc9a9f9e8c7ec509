use failure::Error;
use std::io;

use super::history::{History, InfrastructureLogEvent, TrainLogEvent};
use crate::input::scenario::ScenarioNames;
use crate::railway::engine::Target;
use crate::railway::world::Snapshot;

fn target<W: io::Write>(f: &mut W, names: &ScenarioNames, t: &Target) -> Result<(), Error> {
    match t.signal {
        Some((s, _)) => write!(f,
                               "{{ \"signal\": \"{}\", \"distance\": {}, \"locked\": {} }}",
                               names.signal_name(s),
                               t.distance,
                               t.locked_on)?,
        None => write!(f, "null")?,
    }
    Ok(())
}

pub fn json_snapshot<W: io::Write>(names: &ScenarioNames, snapshot: &Snapshot, f: &mut W) -> Result<(), Error> {
    write!(f, "{{ \"cars\": [")?;
    let mut first = true;
    for car in &snapshot.cars {
        if first { first = false; } else { write!(f, ", ")?; }
        write!(f,
               "{{ \"train\": {}, \"index\": {}, \"current\": \"{}\", \"target\": \"{}\", \
                \"x\": {}, \"y\": {}, \"heading\": {}, \"remaining\": {}, \"limbo\": {}, \"fill\": ",
               car.train,
               car.index,
               names.node_name(car.current),
               names.node_name(car.target),
               car.position.x,
               car.position.y,
               car.heading,
               car.remaining,
               car.limbo)?;
        match car.fill {
            Some(x) => write!(f, "{} }}", x)?,
            None => write!(f, "null }}")?,
        }
    }
    write!(f, "], \"engines\": [")?;
    let mut first = true;
    for e in &snapshot.engines {
        if first { first = false; } else { write!(f, ", ")?; }
        write!(f, "{{ \"train\": {}, \"speed\": {}, \"throttle\": \"{:?}\", \"stop\": ", e.train, e.speed, e.throttle)?;
        target(f, names, &e.stop)?;
        write!(f, ", \"slow\": ")?;
        target(f, names, &e.slow)?;
        let watching = e.watching
            .iter()
            .map(|&(s, _)| format!("\"{}\"", names.signal_name(s)))
            .collect::<Vec<String>>();
        write!(f, ", \"watching\": [{}] }}", watching.join(", "))?;
    }
    write!(f, "] }}")?;
    Ok(())
}

pub fn json_history<W: io::Write>(names: &ScenarioNames, history: &History, f: &mut W) -> Result<(), Error> {
    let w = |f: &mut W, t: f64, e: &str, r: &str, v: &str| -> Result<(), Error> {
        write!(f,
               "{{ \"time\": {}, \"event\": \"{}\", \"ref\": \"{}\", \"value\": \"{}\" }}",
               t,
               e,
               r,
               v)?;
        Ok(())
    };

    write!(f, "{{ \"infrastructure\": [")?;
    let mut t = 0.0;
    let mut first = true;
    for ev in &history.inf {
        use self::InfrastructureLogEvent::*;
        if let Wait(dt) = *ev {
            t += dt;
            continue;
        }
        if first { first = false; } else { write!(f, ", ")?; }
        match *ev {
            Wait(_) => {}
            Aspect(s, approach, state) => {
                let r = format!("{}/{}", names.signal_name(s), names.node_name(approach));
                w(f, t, "aspect", &r, &state.to_string())?;
            }
            Occupied(node, car, x) => {
                let v = format!("{}:{}:{}", car.train, car.car, x);
                w(f, t, "occupied", names.node_name(node), &v)?;
            }
        }
    }
    write!(f, "]")?;

    write!(f, ", \"trains\": {{ ")?;
    let mut firsttrain = true;
    for &(ref name, ref params, ref his) in &history.trains {
        if firsttrain { firsttrain = false; } else { write!(f, ", ")?; }
        write!(f,
               " \"{}\": {{ \"params\": {{ \"top_speed\": {}, \"acceleration\": {}, \"deceleration\": {} }}, \
                \"events\": [",
               name,
               params.top_speed,
               params.acceleration,
               params.deceleration)?;

        let mut t = 0.0;
        let mut x = 0.0;
        let mut first = true;
        for ev in his {
            use self::TrainLogEvent::*;
            if first { first = false; } else { write!(f, ", ")?; }
            match *ev {
                Move(dt, dx, v) => {
                    t += dt;
                    x += dx;
                    write!(f, "{{ \"time\": {}, \"x\": {}, \"dx\": {}, \"v\": {} }}", t, x, dx, v)?;
                }
                Node(n) => w(f, t, "node", names.node_name(n), "")?,
                Stopped(n) => w(f, t, "stopped", names.node_name(n), "")?,
                Throttle(th) => w(f, t, "throttle", "", &format!("{:?}", th))?,
                StopTarget(s) => w(f, t, "stop_target", s.map(|s| names.signal_name(s)).unwrap_or(""), "")?,
                SlowTarget(s) => w(f, t, "slow_target", s.map(|s| names.signal_name(s)).unwrap_or(""), "")?,
                Loading(on) => w(f, t, "loading", "", if on { "true" } else { "false" })?,
                Anomaly(a) => w(f, t, "anomaly", "", &format!("{:?}", a))?,
            }
        }
        write!(f, "] }}")?;
    }
    write!(f, " }}")?;

    write!(f, ", \"distance\": {}, \"deliveries\": {{", history.tracking.distance)?;
    let mut deliveries = history.tracking.deliveries.iter().collect::<Vec<_>>();
    deliveries.sort_by_key(|&(l, _)| l.to_string());
    let deliveries = deliveries
        .iter()
        .map(|&(l, a)| format!("\"{}\": {}", l, a))
        .collect::<Vec<String>>();
    write!(f, "{}}}", deliveries.join(", "))?;

    write!(f, ", \"snapshot\": ")?;
    json_snapshot(names, &history.snapshot, f)?;
    write!(f, " }}")?;
    Ok(())
}
