mod consumers;
mod helpers;
mod server;
