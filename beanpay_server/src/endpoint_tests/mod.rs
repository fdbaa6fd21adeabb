mod mocks;
mod orders;
mod webhook;
