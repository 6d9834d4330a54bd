use bson::{Document, RawDocumentBuf};

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{ErrorKind, Result},
    operation::Operation,
    options::SelectionCriteria,
};

/// Runs an arbitrary command against a database, passing the document through unmodified (spec
/// §4.7's `runCommand` row).
#[derive(Debug, Clone)]
pub(crate) struct RunCommand {
    db: String,
    command: RawDocumentBuf,
    selection_criteria: Option<SelectionCriteria>,
}

impl RunCommand {
    pub(crate) fn new(
        db: String,
        command: Document,
        selection_criteria: Option<SelectionCriteria>,
    ) -> Result<Self> {
        Ok(Self {
            db,
            command: RawDocumentBuf::from_document(&command)?,
            selection_criteria,
        })
    }

    fn command_name(&self) -> Option<&str> {
        self.command
            .into_iter()
            .next()
            .and_then(|r| r.ok())
            .map(|(k, _)| k)
    }
}

impl Operation for RunCommand {
    type O = Document;

    // The server never sees this name; `build` always sends the caller's own command verbatim.
    const NAME: &'static str = "$genericRunCommand";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        self.command_name().ok_or(ErrorKind::InvalidArgument {
            message: "an empty document cannot be passed to a run_command operation".into(),
        })?;

        Ok(Command::new(self.db.clone(), self.command.clone()))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        response.body()
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.selection_criteria.as_ref()
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;

    #[test]
    fn empty_command_is_rejected() {
        let mut run_command = RunCommand::new("db".to_string(), doc! {}, None).unwrap();
        assert!(run_command.build(&StreamDescription::initial()).is_err());
    }

    #[test]
    fn build_sends_the_command_unmodified() {
        let mut run_command = RunCommand::new("db".to_string(), doc! { "ping": 1 }, None).unwrap();
        let command = run_command.build(&StreamDescription::initial()).unwrap();
        assert_eq!(command.target_db, "db");
        assert_eq!(command.body.get_i32("ping").unwrap(), 1);
    }
}
