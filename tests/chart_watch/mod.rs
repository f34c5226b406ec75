mod check;
mod declare;
