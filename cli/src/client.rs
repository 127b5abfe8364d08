use std::collections::HashMap;

use canopy_core::{
    comm,
    messages::{ConnectKind, Hello, Notification, RequestBody, RequestBuilder},
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, Lines, ReadHalf, WriteHalf},
    sync::mpsc,
};

use crate::{
    command_parser::{self, Command, HELP},
    prelude::*,
    render,
};

/// Reads commands from `input`, sends them to the daemon and prints every
/// notification to `output` as it arrives.
pub struct Client<S, I, O> {
    writer: WriteHalf<S>,
    reader: Option<ReadHalf<S>>,
    input: Lines<I>,
    output: O,
    pending: HashMap<u32, &'static str>,
}

impl<S, I, O> Client<S, I, O>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    pub fn new(stream: S, input: I, output: O) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            writer,
            reader: Some(reader),
            input: input.lines(),
            output,
            pending: HashMap::new(),
        }
    }

    /// Runs until the user quits, input ends or the daemon hangs up.
    #[instrument(skip(self))]
    pub async fn run(mut self, kind: ConnectKind) -> Result<()> {
        comm::write_message(&mut self.writer, &Hello { kind }).await?;
        let (tx, mut notifications) = mpsc::unbounded_channel();
        let reader = self.reader.take().map(|reader| tokio::spawn(read_notifications(reader, tx)));

        loop {
            tokio::select! {
                line = self.input.next_line() => {
                    let Some(line) = line? else {
                        debug!("input closed");
                        break;
                    };
                    match command_parser::parse(&line) {
                        Ok(None) => {}
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(Command::Help)) => self.print(HELP).await?,
                        Ok(Some(Command::Request(body))) => self.send(body).await?,
                        Err(e) => self.print(&e.to_string()).await?,
                    }
                },
                notification = notifications.recv() => {
                    let Some(notification) = notification else {
                        self.print("daemon closed the connection").await?;
                        break;
                    };
                    let op = notification.change_id().and_then(|id| self.pending.remove(&id));
                    self.print(&render::describe(&notification, op)).await?;
                    if notification.is_terminal() {
                        break;
                    }
                },
            }
        }

        if let Some(reader) = reader {
            reader.abort();
        }
        Ok(())
    }

    async fn send(&mut self, body: RequestBody) -> Result<()> {
        let op = body.name();
        let request = RequestBuilder::default().body(body).build();
        trace!(change_id = request.change_id, op, "sending");
        self.pending.insert(request.change_id, op);
        comm::write_message(&mut self.writer, &request)
            .await
            .map_err(|source| Error::SendRequest { op, source })
    }

    async fn print(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }
}

async fn read_notifications<R: AsyncRead>(mut reader: ReadHalf<R>, tx: mpsc::UnboundedSender<Notification>) {
    loop {
        match comm::read_message::<_, Notification>(&mut reader).await {
            Ok(notification) => {
                if tx.send(notification).is_err() {
                    return;
                }
            }
            Err(e) => {
                if !comm::is_disconnect(&e) {
                    error!(%e, "bad frame from daemon");
                }
                return;
            }
        }
    }
}
