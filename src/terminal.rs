//! Line-oriented presentation surface for running a survey in a terminal

use std::io::{self, BufRead, Write};

use anyhow::Result;

use crate::{
    controller::{Prompt, SurveyController, SurveyEvent, SurveyListener, SurveyUpdate},
    results::HeatmapPayload,
    sampling::Granularity,
    session::Answer,
};

enum Command {
    Event(SurveyEvent),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "n" | "north" => Some(Command::Event(SurveyEvent::Answer(Answer::North))),
        "s" | "south" => Some(Command::Event(SurveyEvent::Answer(Answer::South))),
        "b" | "back" => Some(Command::Event(SurveyEvent::Back)),
        "q" | "quit" => Some(Command::Quit),
        _ => None,
    }
}

struct TerminalListener<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> TerminalListener<W> {
    fn record(&mut self, result: io::Result<()>) {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
    }

    fn take_error(&mut self) -> io::Result<()> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<W: Write> SurveyListener for TerminalListener<W> {
    fn on_present(&mut self, prompt: &Prompt) {
        let previous = match prompt.previous {
            Some(Answer::North) => " [was: north]",
            Some(Answer::South) => " [was: south]",
            None => "",
        };
        let result = writeln!(
            self.out,
            "{}{}  ({:.4}, {:.4})\n[n]orth / [s]outh / [b]ack / [q]uit",
            prompt.question(),
            previous,
            prompt.position.lat,
            prompt.position.lng
        );
        self.record(result);
    }

    fn on_back_refused(&mut self, _prompt: &Prompt) {
        let result = writeln!(
            self.out,
            "Already at the first city. To go back to the menu, quit and start again."
        );
        self.record(result);
    }

    fn on_complete(&mut self, result: &HeatmapPayload) {
        let written = writeln!(
            self.out,
            "Done: {} cities answered, {:.0}% placed in the South.",
            result.points.len(),
            result.south_share() * 100.0
        );
        self.record(written);
    }
}

/// Runs one survey reading commands from `input`. Returns `None` if the user
/// quits or the input ends before the last answer.
pub fn run_survey<R: BufRead, W: Write>(
    controller: &mut SurveyController,
    granularity: Granularity,
    input: R,
    output: W,
) -> Result<Option<HeatmapPayload>> {
    let mut listener = TerminalListener { out: output, error: None };
    writeln!(listener.out, "Welcome to the North-South divide preference revealer.")?;
    writeln!(listener.out, "Level of detail: {granularity}")?;

    let mut update = controller.start(granularity, &mut listener)?;
    listener.take_error()?;

    let mut lines = input.lines();
    while !matches!(update, SurveyUpdate::Completed { .. }) {
        let Some(line) = lines.next() else {
            return Ok(None);
        };
        match parse_command(&line?) {
            Some(Command::Event(event)) => {
                update = controller.handle(event, &mut listener)?;
                listener.take_error()?;
            }
            Some(Command::Quit) => return Ok(None),
            None => writeln!(listener.out, "Please answer n, s, b or q.")?,
        }
    }

    Ok(controller.result().cloned())
}
