mod helpers;
mod pledges;
mod webhook;
